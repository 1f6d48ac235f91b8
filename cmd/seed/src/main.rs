//! # Seed
//!
//! Fills a fresh database with a starter category tree, an editor account
//! and a welcome post. Safe to run twice: anything already present is left
//! alone.
//!
//! The editor is only created when `INKWELL_SEED_EDITOR_PASSWORD` is set.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use auth_adapters::{Argon2PasswordHasher, DisabledVerifier};
use configs::{AppConfig, LogFormat, LoggingConfig};
use domains::{
    CategoryRepository, MediaStorage, NewCategory, NewPost, PostRepository, Registration,
    UserRepository, SYSTEM_USER_ID,
};
use services::{AccountService, CategoryService, PostService, RatingLedger, SlugGenerator};
use storage_adapters::{LocalMediaStorage, SqliteStore};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const STARTER_TREE: &[(&str, &[&str])] = &[
    ("Technology", &["Rust", "Databases", "Web"]),
    ("Life", &["Books", "Travel"]),
    ("News", &[]),
];

const EDITOR_USERNAME: &str = "editor";

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.logging);

    let store = SqliteStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("opening database")?;
    store.migrate().await.context("running migrations")?;

    let slugs = SlugGenerator::new(config.content.slug_attempts);
    let category_repo: Arc<dyn CategoryRepository> = Arc::new(store.categories());
    let categories = CategoryService::new(category_repo.clone(), slugs);

    // 1. Categories
    let mut first_leaf = None;
    for (root_title, children) in STARTER_TREE {
        let root = ensure_category(&categories, root_title, None).await?;
        for child_title in children.iter() {
            let child = ensure_category(&categories, child_title, Some(root)).await?;
            first_leaf.get_or_insert(child);
        }
    }

    // 2. Editor account
    let users: Arc<dyn UserRepository> = Arc::new(store.users());
    let media: Arc<dyn MediaStorage> = Arc::new(LocalMediaStorage::new(
        config.media.root.clone(),
        config.media.url_prefix.clone(),
    ));
    let author = match std::env::var("INKWELL_SEED_EDITOR_PASSWORD") {
        Ok(password) => ensure_editor(users, media.clone(), password).await?,
        Err(_) => {
            info!("INKWELL_SEED_EDITOR_PASSWORD not set, posting as the system user");
            SYSTEM_USER_ID
        }
    };

    // 3. Welcome post
    let post_repo: Arc<dyn PostRepository> = Arc::new(store.posts());
    let ledger = Arc::new(RatingLedger::new(Arc::new(store.ratings()), post_repo.clone()));
    let posts = PostService::new(
        post_repo,
        category_repo,
        ledger,
        media,
        slugs,
        config.content.page_size,
    );
    if let Some(category_id) = first_leaf {
        if posts.get_by_slug("welcome").await.is_err() {
            let post = posts
                .create(
                    author,
                    NewPost {
                        title: "Welcome".into(),
                        slug: Some("welcome".into()),
                        description: "What this blog is about.".into(),
                        text: "First post. Edit or delete it once you have written your own."
                            .into(),
                        category_id,
                        fixed: true,
                        ..Default::default()
                    },
                )
                .await
                .context("creating welcome post")?;
            info!(slug = %post.slug, "welcome post created");
        }
    }

    info!("seeding complete");
    Ok(())
}

async fn ensure_category(
    categories: &CategoryService,
    title: &str,
    parent_id: Option<Uuid>,
) -> anyhow::Result<Uuid> {
    let slug = domains::slug::slugify(title);
    if let Ok(existing) = categories.get_by_slug(&slug).await {
        return Ok(existing.id);
    }
    let created = categories
        .create(NewCategory {
            title: title.to_string(),
            description: format!("Posts about {}", title.to_lowercase()),
            parent_id,
            ..Default::default()
        })
        .await
        .with_context(|| format!("creating category {title}"))?;
    info!(slug = %created.slug, "category created");
    Ok(created.id)
}

async fn ensure_editor(
    users: Arc<dyn UserRepository>,
    media: Arc<dyn MediaStorage>,
    password: String,
) -> anyhow::Result<Uuid> {
    if let Some(user) = users.find_by_username(EDITOR_USERNAME).await? {
        return Ok(user.id);
    }
    let accounts = AccountService::new(
        users,
        Arc::new(Argon2PasswordHasher::default()),
        Arc::new(DisabledVerifier),
        media,
        Duration::from_secs(1),
    );
    let user = accounts
        .register(Registration {
            username: EDITOR_USERNAME.into(),
            password_confirmation: password.clone(),
            password,
            email: "editor@inkwell.local".into(),
            first_name: "Site".into(),
            last_name: "Editor".into(),
        })
        .await
        .context("registering editor")?;
    info!(user_id = %user.id, "editor account created");
    Ok(user.id)
}
