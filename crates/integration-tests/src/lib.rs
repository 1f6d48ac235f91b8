//! Shared fixture for the end-to-end tests: every service wired to a fresh
//! SQLite store, with uploads going to a temporary directory.

use std::sync::Arc;
use std::time::Duration;

use auth_adapters::{Argon2PasswordHasher, DisabledVerifier};
use domains::{
    CaptchaVerifier, Category, CategoryRepository, Comment, MediaStorage, NewCategory,
    NewComment, NewPost, Post, PostRepository, PublicationStatus, Registration, User,
    UserRepository,
};
use services::{
    AccountService, CategoryService, CommentService, PostService, RatingLedger, SlugGenerator,
};
use storage_adapters::{LocalMediaStorage, SqliteStore};
use tempfile::TempDir;
use uuid::Uuid;

pub const PAGE_SIZE: u32 = 10;
pub const PASSWORD: &str = "correct-horse-42";

pub struct TestApp {
    pub store: SqliteStore,
    pub categories: CategoryService,
    pub posts: PostService,
    pub comments: CommentService,
    pub ratings: Arc<RatingLedger>,
    pub accounts: AccountService,
    _dir: TempDir,
}

impl TestApp {
    /// In-memory store, CAPTCHA always passing.
    pub async fn new() -> Self {
        Self::with_captcha(Arc::new(DisabledVerifier), Duration::from_secs(1)).await
    }

    pub async fn with_captcha(captcha: Arc<dyn CaptchaVerifier>, timeout: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        Self::build(store, captcha, timeout, dir)
    }

    /// A database file with a real connection pool, for tests that need
    /// writers to overlap.
    pub async fn on_disk() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("inkwell.db").display());
        let store = SqliteStore::connect(&url, 8).await.unwrap();
        store.migrate().await.unwrap();
        Self::build(store, Arc::new(DisabledVerifier), Duration::from_secs(1), dir)
    }

    fn build(
        store: SqliteStore,
        captcha: Arc<dyn CaptchaVerifier>,
        captcha_timeout: Duration,
        dir: TempDir,
    ) -> Self {
        let media: Arc<dyn MediaStorage> = Arc::new(LocalMediaStorage::new(
            dir.path().join("media"),
            "/media".into(),
        ));
        let post_repo: Arc<dyn PostRepository> = Arc::new(store.posts());
        let category_repo: Arc<dyn CategoryRepository> = Arc::new(store.categories());
        let user_repo: Arc<dyn UserRepository> = Arc::new(store.users());
        let slugs = SlugGenerator::default();

        let ratings = Arc::new(RatingLedger::new(Arc::new(store.ratings()), post_repo.clone()));
        let posts = PostService::new(
            post_repo.clone(),
            category_repo.clone(),
            ratings.clone(),
            media.clone(),
            slugs,
            PAGE_SIZE,
        );
        let hasher = Argon2PasswordHasher::with_params(1024, 1, 1).unwrap();

        Self {
            categories: CategoryService::new(category_repo, slugs),
            comments: CommentService::new(Arc::new(store.comments()), post_repo),
            accounts: AccountService::new(
                user_repo,
                Arc::new(hasher),
                captcha,
                media,
                captcha_timeout,
            ),
            posts,
            ratings,
            store,
            _dir: dir,
        }
    }

    pub async fn category(&self, title: &str, parent_id: Option<Uuid>) -> Category {
        self.categories
            .create(NewCategory {
                title: title.into(),
                parent_id,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn post(&self, author_id: Uuid, title: &str, category_id: Uuid) -> Post {
        self.post_with(author_id, title, category_id, PublicationStatus::Published, false)
            .await
    }

    pub async fn post_with(
        &self,
        author_id: Uuid,
        title: &str,
        category_id: Uuid,
        status: PublicationStatus,
        fixed: bool,
    ) -> Post {
        self.posts
            .create(
                author_id,
                NewPost {
                    title: title.into(),
                    description: format!("About {title}"),
                    text: "Lorem ipsum".into(),
                    category_id,
                    status,
                    fixed,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    pub async fn comment(
        &self,
        author_id: Uuid,
        post_id: Uuid,
        parent_id: Option<Uuid>,
        content: &str,
    ) -> Comment {
        self.comments
            .add(
                author_id,
                NewComment {
                    post_id,
                    content: content.into(),
                    parent_id,
                },
            )
            .await
            .unwrap()
    }

    pub async fn user(&self, username: &str, email: &str) -> User {
        self.accounts
            .register(registration(username, email))
            .await
            .unwrap()
    }

    /// Row count of `table`.
    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.store.pool())
            .await
            .unwrap()
    }
}

pub fn registration(username: &str, email: &str) -> Registration {
    Registration {
        username: username.into(),
        password: PASSWORD.into(),
        password_confirmation: PASSWORD.into(),
        email: email.into(),
        first_name: "Test".into(),
        last_name: "User".into(),
    }
}
