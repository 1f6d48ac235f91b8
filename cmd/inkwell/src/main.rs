//! # Inkwell server
//!
//! Assembles the configured adapters behind the services and serves the
//! JSON surface until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use api_adapters::{router, AppState, Metrics};
use auth_adapters::{Argon2PasswordHasher, DisabledVerifier, RecaptchaVerifier};
use configs::{AppConfig, CaptchaConfig, LogFormat, LoggingConfig};
use domains::{CaptchaVerifier, CategoryRepository, MediaStorage, PostRepository};
use secrecy::{ExposeSecret, SecretString};
use services::{
    AccountService, CategoryService, CommentService, PostService, RatingLedger, SlugGenerator,
};
use storage_adapters::{LocalMediaStorage, SqliteStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// reCAPTCHA when enabled, otherwise a verifier that lets every login through.
fn captcha_verifier(captcha: &CaptchaConfig) -> anyhow::Result<Arc<dyn CaptchaVerifier>> {
    if !captcha.enabled {
        tracing::warn!("captcha disabled, logins are not challenged");
        return Ok(Arc::new(DisabledVerifier));
    }
    let verifier = RecaptchaVerifier::new(
        SecretString::from(captcha.secret.expose_secret().to_owned()),
        captcha.verify_url.clone(),
        captcha.timeout(),
    )
    .context("building recaptcha client")?;
    info!(verify_url = %captcha.verify_url, "recaptcha enabled");
    Ok(Arc::new(verifier))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.logging);

    // 1. Datastore
    let store = SqliteStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("opening database")?;
    store.migrate().await.context("running migrations")?;

    // 2. Media
    let media: Arc<dyn MediaStorage> = Arc::new(LocalMediaStorage::new(
        config.media.root.clone(),
        config.media.url_prefix.clone(),
    ));

    // 3. Services
    let slugs = SlugGenerator::new(config.content.slug_attempts);
    let post_repo: Arc<dyn PostRepository> = Arc::new(store.posts());
    let category_repo: Arc<dyn CategoryRepository> = Arc::new(store.categories());
    let ratings = Arc::new(RatingLedger::new(Arc::new(store.ratings()), post_repo.clone()));
    let posts = Arc::new(PostService::new(
        post_repo.clone(),
        category_repo.clone(),
        ratings.clone(),
        media.clone(),
        slugs,
        config.content.page_size,
    ));
    let categories = Arc::new(CategoryService::new(category_repo, slugs));
    let comments = Arc::new(CommentService::new(Arc::new(store.comments()), post_repo));
    let accounts = Arc::new(AccountService::new(
        Arc::new(store.users()),
        Arc::new(Argon2PasswordHasher::default()),
        captcha_verifier(&config.captcha)?,
        media,
        config.captcha.timeout(),
    ));

    // 4. HTTP
    let state = AppState {
        posts,
        comments,
        categories,
        ratings,
        accounts,
        metrics: Arc::new(Metrics::new()),
        trust_forwarded_for: config.server.trust_forwarded_for,
    };
    let app = router(state);

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(%address, "inkwell listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captcha(enabled: bool) -> CaptchaConfig {
        CaptchaConfig {
            enabled,
            secret: SecretString::from("site-secret".to_string()),
            ..Default::default()
        }
    }

    // A blank response never reaches the network: reCAPTCHA refuses it,
    // the disabled verifier waves it through.
    #[tokio::test]
    async fn test_enabled_config_picks_recaptcha() {
        let verifier = captcha_verifier(&captcha(true)).unwrap();
        assert!(!verifier.verify("", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_config_accepts_everything() {
        let verifier = captcha_verifier(&captcha(false)).unwrap();
        assert!(verifier.verify("", None).await.unwrap());
    }
}
