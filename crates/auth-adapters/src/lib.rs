//! inkwell/crates/auth-adapters/src/lib.rs
//!
//! Credential and challenge adapters: Argon2 password hashing and CAPTCHA
//! verification.

pub mod captcha;
pub mod password;

pub use captcha::DisabledVerifier;
#[cfg(feature = "recaptcha")]
pub use captcha::RecaptchaVerifier;
pub use password::Argon2PasswordHasher;

use thiserror::Error;

/// Construction-time failures of the adapters.
#[derive(Debug, Error)]
pub enum AuthAdapterError {
    #[error("invalid argon2 parameters: {0}")]
    Params(argon2::Error),

    #[cfg(feature = "recaptcha")]
    #[error("could not build http client: {0}")]
    Client(#[from] reqwest::Error),
}
