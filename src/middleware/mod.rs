//! HTTP middleware for request admission and observability.
//!
//! - **Panic recovery**: outermost; turns a panic into a 500 and closes the connection
//! - **Rate limiting**: global bucket, then a per-client bucket with idle expiry
//! - **Pipeline**: per-route authentication, activation and permission stages
//! - **Metrics**: request counts and latency by route template
//!
//! # Architecture
//!
//! ```text
//! Request → Panic recovery → Rate limiter → Request ID / Trace / CORS
//!              ↓                 ↓
//!          500 + close      429 Too Many
//!
//!         → Authenticate → Require activated → Require permission → Handler
//!              ↓                ↓                     ↓
//!          401 Unauth      401 / 403              403 Forbidden
//! ```

pub mod ip;
pub mod metrics;
pub mod panic;
pub mod pipeline;
pub mod rate_limit;

pub use ip::client_host;
pub use metrics::track_metrics;
pub use panic::{PanicRecoveryLayer, install_panic_hook};
pub use pipeline::{Pipeline, PipelineError, Stage};
pub use rate_limit::{RateLimitError, RateLimitLayer, TrustedProxyConfig, TwoTierLimiter};
