//! CAPTCHA verifiers.
//!
//! `RecaptchaVerifier` talks to the reCAPTCHA `siteverify` endpoint.
//! `DisabledVerifier` accepts every response and is meant for local
//! development, where no site key exists.

use std::net::IpAddr;

use async_trait::async_trait;
use domains::{CaptchaVerifier, Result};
use tracing::debug;

#[cfg(feature = "recaptcha")]
pub use self::recaptcha::RecaptchaVerifier;

/// Accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledVerifier;

#[async_trait]
impl CaptchaVerifier for DisabledVerifier {
    async fn verify(&self, _response: &str, remote_ip: Option<IpAddr>) -> Result<bool> {
        debug!(?remote_ip, "captcha disabled, accepting challenge");
        Ok(true)
    }
}

#[cfg(feature = "recaptcha")]
mod recaptcha {
    use std::net::IpAddr;
    use std::time::Duration;

    use async_trait::async_trait;
    use domains::{CaptchaVerifier, DomainError, Result};
    use secrecy::{ExposeSecret, SecretString};
    use serde::Deserialize;
    use tracing::{debug, warn};

    use crate::AuthAdapterError;

    #[derive(Debug, Deserialize)]
    struct SiteVerifyReply {
        success: bool,
        #[serde(default, rename = "error-codes")]
        error_codes: Vec<String>,
    }

    /// Server-side reCAPTCHA check. The HTTP client carries its own timeout;
    /// callers still wrap `verify` in theirs so a slow DNS lookup cannot hang
    /// a login.
    pub struct RecaptchaVerifier {
        client: reqwest::Client,
        secret: SecretString,
        verify_url: String,
    }

    impl RecaptchaVerifier {
        pub fn new(
            secret: SecretString,
            verify_url: impl Into<String>,
            timeout: Duration,
        ) -> std::result::Result<Self, AuthAdapterError> {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            Ok(Self {
                client,
                secret,
                verify_url: verify_url.into(),
            })
        }
    }

    fn unavailable(err: reqwest::Error) -> DomainError {
        warn!(error = %err, "recaptcha siteverify unreachable");
        DomainError::Challenge("verification service unavailable".into())
    }

    #[async_trait]
    impl CaptchaVerifier for RecaptchaVerifier {
        async fn verify(&self, response: &str, remote_ip: Option<IpAddr>) -> Result<bool> {
            if response.trim().is_empty() {
                return Ok(false);
            }

            let mut form = vec![
                ("secret", self.secret.expose_secret().to_string()),
                ("response", response.to_string()),
            ];
            if let Some(ip) = remote_ip {
                form.push(("remoteip", ip.to_string()));
            }

            let reply: SiteVerifyReply = self
                .client
                .post(&self.verify_url)
                .form(&form)
                .send()
                .await
                .map_err(unavailable)?
                .error_for_status()
                .map_err(unavailable)?
                .json()
                .await
                .map_err(unavailable)?;

            if !reply.success {
                debug!(codes = ?reply.error_codes, "recaptcha rejected response");
            }
            Ok(reply.success)
        }
    }

}
