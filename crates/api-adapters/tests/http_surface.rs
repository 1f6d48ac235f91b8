//! End-to-end checks of the JSON surface against an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use api_adapters::{router, AppState, Metrics};
use auth_adapters::{Argon2PasswordHasher, DisabledVerifier};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use domains::{
    CategoryRepository, MediaStorage, NewCategory, NewComment, NewPost, Post, PostRepository,
    PublicationStatus, Registration, SYSTEM_USER_ID,
};
use serde_json::{json, Value};
use services::{
    AccountService, CategoryService, CommentService, PostService, RatingLedger, SlugGenerator,
};
use storage_adapters::{LocalMediaStorage, SqliteStore};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

struct Harness {
    app: Router,
    posts: Arc<PostService>,
    categories: Arc<CategoryService>,
    comments: Arc<CommentService>,
    accounts: Arc<AccountService>,
    _media: TempDir,
}

async fn harness(trust_forwarded_for: bool) -> Harness {
    let store = SqliteStore::in_memory().await.unwrap();
    let post_repo: Arc<dyn PostRepository> = Arc::new(store.posts());
    let category_repo: Arc<dyn CategoryRepository> = Arc::new(store.categories());
    let media_dir = tempfile::tempdir().unwrap();
    let media: Arc<dyn MediaStorage> = Arc::new(LocalMediaStorage::new(
        media_dir.path().to_path_buf(),
        "/media".into(),
    ));

    let ratings = Arc::new(RatingLedger::new(Arc::new(store.ratings()), post_repo.clone()));
    let posts = Arc::new(PostService::new(
        post_repo.clone(),
        category_repo.clone(),
        ratings.clone(),
        media.clone(),
        SlugGenerator::default(),
        10,
    ));
    let categories = Arc::new(CategoryService::new(category_repo, SlugGenerator::default()));
    let comments = Arc::new(CommentService::new(Arc::new(store.comments()), post_repo));
    let accounts = Arc::new(AccountService::new(
        Arc::new(store.users()),
        Arc::new(Argon2PasswordHasher::with_params(1024, 1, 1).unwrap()),
        Arc::new(DisabledVerifier),
        media,
        Duration::from_secs(1),
    ));

    let state = AppState {
        posts: posts.clone(),
        comments: comments.clone(),
        categories: categories.clone(),
        ratings,
        accounts: accounts.clone(),
        metrics: Arc::new(Metrics::new()),
        trust_forwarded_for,
    };
    Harness {
        app: router(state),
        posts,
        categories,
        comments,
        accounts,
        _media: media_dir,
    }
}

impl Harness {
    async fn category(&self, title: &str, parent_id: Option<Uuid>) -> Uuid {
        self.categories
            .create(NewCategory {
                title: title.into(),
                parent_id,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    async fn post(&self, title: &str, category_id: Uuid, status: PublicationStatus, fixed: bool) -> Post {
        self.posts
            .create(
                SYSTEM_USER_ID,
                NewPost {
                    title: title.into(),
                    description: "summary".into(),
                    text: "body".into(),
                    category_id,
                    status,
                    fixed,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }
}

fn vote(slug: &str, from: &str, value: i64) -> Request<Body> {
    Request::post(format!("/posts/{slug}/votes"))
        .header("content-type", "application/json")
        .header("x-forwarded-for", from)
        .body(Body::from(json!({ "value": value }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_listing_hides_drafts_and_pins_first() {
    let h = harness(false).await;
    let tech = h.category("Tech", None).await;
    h.post("Pinned", tech, PublicationStatus::Published, true).await;
    h.post("Secret", tech, PublicationStatus::Draft, false).await;
    h.post("Fresh", tech, PublicationStatus::Published, false).await;

    let (status, body) = h.get("/posts").await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Pinned", "Fresh"]);
    assert_eq!(body[0]["author"]["username"], "system");
    assert_eq!(body[0]["category"]["slug"], "tech");
}

#[tokio::test]
async fn test_draft_pages_are_not_found() {
    let h = harness(false).await;
    let tech = h.category("Tech", None).await;
    let draft = h.post("Secret", tech, PublicationStatus::Draft, false).await;
    let live = h.post("Hello", tech, PublicationStatus::Published, false).await;

    let (status, body) = h.get(&format!("/posts/{}", draft.slug)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let (status, body) = h.get(&format!("/posts/{}", live.slug)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 0);
    assert_eq!(body["thumbnail_url"], "/media/default.jpg");
}

#[tokio::test]
async fn test_second_vote_from_same_address_conflicts() {
    let h = harness(true).await;
    let tech = h.category("Tech", None).await;
    let post = h.post("Vote me", tech, PublicationStatus::Published, false).await;

    let (status, _) = h.send(vote(&post.slug, "1.2.3.4", 1)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = h.send(vote(&post.slug, "1.2.3.4", -1)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["field"], "ip_address");

    let (status, _) = h.send(vote(&post.slug, "5.6.7.8", 1)).await;
    assert_eq!(status, StatusCode::CREATED);

    let score = Request::get(format!("/posts/{}/score", post.slug))
        .header("x-forwarded-for", "1.2.3.4")
        .body(Body::empty())
        .unwrap();
    let (status, body) = h.send(score).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 2);
    assert_eq!(body["your_vote"], 1);

    let (_, body) = h.get(&format!("/posts/{}/score", post.slug)).await;
    assert_eq!(body["your_vote"], Value::Null);

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let text = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("votes_cast_total 2"));
    assert!(text.contains("vote_conflicts_total 1"));
}

#[tokio::test]
async fn test_vote_validation_and_unknown_client() {
    let h = harness(true).await;
    let tech = h.category("Tech", None).await;
    let post = h.post("Vote me", tech, PublicationStatus::Published, false).await;

    let (status, body) = h.send(vote(&post.slug, "1.2.3.4", 3)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "value");

    let (status, body) = h.send(vote(&post.slug, "nonsense", 1)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "ip_address");

    let untrusted = harness(false).await;
    let tech = untrusted.category("Tech", None).await;
    let post = untrusted
        .post("Vote me", tech, PublicationStatus::Published, false)
        .await;
    let (status, _) = untrusted.send(vote(&post.slug, "1.2.3.4", 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_category_tree_and_breadcrumbs() {
    let h = harness(false).await;
    let tech = h.category("Tech", None).await;
    h.category("Art", None).await;
    let rust = h.category("Rust", Some(tech)).await;
    h.category("Async", Some(rust)).await;

    let (status, body) = h.get("/categories").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["title"], "Art");
    assert_eq!(body[1]["title"], "Tech");
    assert_eq!(body[1]["children"][0]["title"], "Rust");
    assert_eq!(body[1]["children"][0]["children"][0]["title"], "Async");

    let (status, body) = h.get("/categories/rust").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ancestors"][0]["slug"], "tech");
    assert_eq!(body["children"][0]["slug"], "async");

    let (status, _) = h.get("/categories/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comments_are_nested() {
    let h = harness(false).await;
    let tech = h.category("Tech", None).await;
    let post = h.post("Talk", tech, PublicationStatus::Published, false).await;
    let first = h
        .comments
        .add(
            SYSTEM_USER_ID,
            NewComment {
                post_id: post.id,
                content: "first".into(),
                parent_id: None,
            },
        )
        .await
        .unwrap();
    h.comments
        .add(
            SYSTEM_USER_ID,
            NewComment {
                post_id: post.id,
                content: "reply".into(),
                parent_id: Some(first.id),
            },
        )
        .await
        .unwrap();

    let (status, body) = h.get(&format!("/posts/{}/comments", post.slug)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["content"], "first");
    assert_eq!(body[0]["children"][0]["content"], "reply");
}

#[tokio::test]
async fn test_health_and_request_counter() {
    let h = harness(false).await;
    let (status, body) = h.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let text = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("http_requests_total{method=\"GET\",status=\"200\"} 1"));
}

#[tokio::test]
async fn test_login_checks_credentials() {
    let h = harness(false).await;
    h.accounts
        .register(Registration {
            username: "alice".into(),
            password: "correct-horse-42".into(),
            password_confirmation: "correct-horse-42".into(),
            email: "alice@example.com".into(),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
        })
        .await
        .unwrap();

    let login = |password: &str| {
        Request::post("/login")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "username": "alice", "password": password, "captcha_response": "token" })
                    .to_string(),
            ))
            .unwrap()
    };

    let (status, body) = h.send(login("correct-horse-42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert!(body.get("password_hash").is_none());

    let (status, _) = h.send(login("wrong-password-1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
