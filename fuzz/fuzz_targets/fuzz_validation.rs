//! Fuzz testing for request input validation.
//!
//! Everything here runs on untrusted client input before any handler logic,
//! so none of it may panic:
//!
//! - Field validators (`validate_email`, `validate_password_plaintext`, `validate_name`)
//! - Runtime parsing (`"<n> mins"`)
//! - Token shape checks
//! - JSON body decoding and its error messages
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the validation fuzz target
//! cargo +nightly fuzz run fuzz_validation
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;

use greenlight::auth::token;
use greenlight::handlers::extract::decode_json;
use greenlight::models::{CreateMovieRequest, Runtime, UpdateMovieRequest};
use greenlight::validation::{
    Validator, is_email, validate_email, validate_name, validate_password_plaintext,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let mut v = Validator::new();
        validate_email(&mut v, s);
        validate_password_plaintext(&mut v, s);
        validate_name(&mut v, s);
        let _ = v.finish();

        let _ = is_email(s);
        let _ = s.parse::<Runtime>();
        let _ = token::is_well_formed(s);
    }

    // Body decoding works on raw bytes, valid UTF-8 or not
    let _ = decode_json::<CreateMovieRequest>(data);
    let _ = decode_json::<UpdateMovieRequest>(data);
});
