//! Per-route admission pipeline.
//!
//! A [`Pipeline`] is an ordered list of named [`Stage`]s. Each stage looks at
//! the request (and the identity an earlier stage attached) and either lets
//! it continue or ends it with an [`AppError`]. Stages run strictly in the
//! order they were declared; once one fails, nothing after it runs.
//!
//! ```rust,ignore
//! let read = Pipeline::new()
//!     .authenticate(AuthScheme::BearerOrJwt)
//!     .require_activated()
//!     .require_permission("movies:read");
//! let route = read.apply(get(handlers::list_movies), &state)?;
//! ```
//!
//! Authorization stages need an identity, so a pipeline that declares one
//! before `authenticate` is refused when it is applied.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use thiserror::Error;
use tracing::debug;

use crate::auth::{self, AuthScheme, Identity};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolve the caller with one scheme and attach the [`Identity`].
    Authenticate(AuthScheme),
    /// Refuse anonymous callers and inactive accounts.
    RequireActivated,
    /// Refuse accounts without the permission code.
    RequirePermission(&'static str),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Authenticate(scheme) => write!(f, "authenticate({scheme})"),
            Stage::RequireActivated => f.write_str("require_activated"),
            Stage::RequirePermission(code) => write!(f, "require_permission({code})"),
        }
    }
}

impl Stage {
    /// Run this stage against the request head.
    pub async fn run(&self, state: &AppState, parts: &mut Parts) -> AppResult<()> {
        match self {
            Stage::Authenticate(scheme) => {
                let identity = auth::authenticate(state, *scheme, &parts.headers).await?;
                parts.extensions.insert(identity);
                Ok(())
            }
            Stage::RequireActivated => {
                auth::require_activated(attached_identity(parts)?)?;
                Ok(())
            }
            Stage::RequirePermission(code) => {
                let user = attached_identity(parts)?
                    .user()
                    .ok_or(AppError::AuthenticationRequired)?;
                auth::require_permission(&state.models, user, code).await
            }
        }
    }
}

fn attached_identity(parts: &Parts) -> AppResult<&Identity> {
    parts.extensions.get::<Identity>().ok_or_else(|| {
        AppError::Internal(format!(
            "authorization stage ran without identity on {}",
            parts.uri.path()
        ))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("stage {0} needs an authenticate stage before it")]
    AuthorizationBeforeAuthentication(Stage),

    #[error("pipeline authenticates more than once")]
    DuplicateAuthentication,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticate(self, scheme: AuthScheme) -> Self {
        self.stage(Stage::Authenticate(scheme))
    }

    pub fn require_activated(self) -> Self {
        self.stage(Stage::RequireActivated)
    }

    pub fn require_permission(self, code: &'static str) -> Self {
        self.stage(Stage::RequirePermission(code))
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Check stage ordering.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut authenticated = false;
        for stage in &self.stages {
            match stage {
                Stage::Authenticate(_) if authenticated => {
                    return Err(PipelineError::DuplicateAuthentication);
                }
                Stage::Authenticate(_) => authenticated = true,
                other if !authenticated => {
                    return Err(PipelineError::AuthorizationBeforeAuthentication(*other));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Run every stage in order, stopping at the first failure.
    pub async fn run(&self, state: &AppState, parts: &mut Parts) -> AppResult<()> {
        run_stages(&self.stages, state, parts).await
    }

    /// Install the stages in front of `route`.
    pub fn apply(
        self,
        route: MethodRouter<AppState>,
        state: &AppState,
    ) -> Result<MethodRouter<AppState>, PipelineError> {
        self.validate()?;
        if self.stages.is_empty() {
            return Ok(route);
        }

        let pipeline_state = PipelineState {
            app: state.clone(),
            stages: self.stages.into(),
        };
        Ok(route.layer(middleware::from_fn_with_state(
            pipeline_state,
            pipeline_middleware,
        )))
    }
}

async fn run_stages(stages: &[Stage], state: &AppState, parts: &mut Parts) -> AppResult<()> {
    for stage in stages {
        if let Err(e) = stage.run(state, parts).await {
            debug!(stage = %stage, path = %parts.uri.path(), "Pipeline stage refused request");
            return Err(e);
        }
    }
    Ok(())
}

#[derive(Clone)]
struct PipelineState {
    app: AppState,
    stages: Arc<[Stage]>,
}

async fn pipeline_middleware(
    State(pipeline): State<PipelineState>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();
    match run_stages(&pipeline.stages, &pipeline.app, &mut parts).await {
        Ok(()) => next.run(Request::from_parts(parts, body)).await,
        Err(e) => e.into_response(),
    }
}
