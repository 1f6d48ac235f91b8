//! # Axum routing
//!
//! Mounts the JSON endpoints, request counting and tracing.
//!
//! # Developer Note
//! Handlers only hold `Arc`s to services; the router owns no storage of its
//! own, so the binary decides which adapters sit behind each service.

mod error;
mod extract;
mod handlers;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use services::{AccountService, CategoryService, CommentService, PostService, RatingLedger};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ErrorBody};
pub use extract::ClientAddr;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub categories: Arc<CategoryService>,
    pub ratings: Arc<RatingLedger>,
    pub accounts: Arc<AccountService>,
    pub metrics: Arc<crate::Metrics>,
    /// Read the client address from `X-Forwarded-For` instead of the socket.
    pub trust_forwarded_for: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/posts", get(handlers::list_posts))
        .route("/posts/{slug}", get(handlers::get_post))
        .route("/posts/{slug}/comments", get(handlers::post_comments))
        .route("/posts/{slug}/score", get(handlers::post_score))
        .route("/posts/{slug}/votes", post(handlers::cast_vote))
        .route("/categories", get(handlers::category_forest))
        .route("/categories/{slug}", get(handlers::get_category))
        .route("/login", post(handlers::login))
        .route("/metrics", get(handlers::metrics))
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;
    state
        .metrics
        .record_request(method.as_str(), response.status().as_u16());
    response
}
