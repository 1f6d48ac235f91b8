//! # Handlers
//!
//! Thin translations between HTTP and the services. Drafts are invisible
//! here: every post lookup goes through the published views.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::{
    Category, Comment, Constraint, DomainError, Post, PostView, PublicationStatus, Rating,
    RatingValue, TreeNode, User,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use services::{PostDetail, PostQuery};
use tracing::error;

use super::{ApiError, AppState, ClientAddr};

type ApiResult<T> = Result<T, ApiError>;

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub value: i64,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Token produced by the reCAPTCHA widget.
    #[serde(default)]
    pub captcha_response: String,
}

#[derive(Debug, Serialize)]
pub struct ScoreView {
    pub score: i64,
    /// The vote cast from the caller's address, when one was recorded.
    pub your_vote: Option<RatingValue>,
}

#[derive(Debug, Serialize)]
pub struct CategoryPage {
    #[serde(flatten)]
    pub category: Category,
    /// Root first, direct parent last.
    pub ancestors: Vec<Category>,
    pub children: Vec<Category>,
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
) -> ApiResult<Json<Vec<PostView>>> {
    Ok(Json(state.posts.list_published(query).await?))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<PostDetail>> {
    Ok(Json(state.posts.get_published(&slug).await?))
}

pub async fn post_comments(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Vec<TreeNode<Comment>>>> {
    let post = published(&state, &slug).await?;
    Ok(Json(state.comments.thread_tree(post.id).await?))
}

pub async fn post_score(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    client: Option<ClientAddr>,
) -> ApiResult<Json<ScoreView>> {
    let post = published(&state, &slug).await?;
    let score = state.ratings.score_of(post.id).await?;
    let your_vote = match client {
        Some(ClientAddr(ip)) => state
            .ratings
            .vote_of(post.id, &ip.to_string())
            .await?
            .map(|r| r.value),
        None => None,
    };
    Ok(Json(ScoreView { score, your_vote }))
}

pub async fn cast_vote(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    ClientAddr(ip): ClientAddr,
    Json(vote): Json<VoteRequest>,
) -> ApiResult<(StatusCode, Json<Rating>)> {
    let post = published(&state, &slug).await?;
    match state
        .ratings
        .cast_vote(post.id, &ip.to_string(), vote.value, None)
        .await
    {
        Ok(rating) => {
            state.metrics.votes_cast.inc();
            Ok((StatusCode::CREATED, Json(rating)))
        }
        Err(e) => {
            if e.is_conflict_on(Constraint::RatingAddress) {
                state.metrics.vote_conflicts.inc();
            }
            Err(e.into())
        }
    }
}

/// Checks the challenge, then the credentials. Issues no session; the
/// caller gets the account back on success.
pub async fn login(
    State(state): State<AppState>,
    client: Option<ClientAddr>,
    Json(form): Json<LoginRequest>,
) -> ApiResult<Json<User>> {
    let remote_ip = client.map(|ClientAddr(ip)| ip);
    let user = state
        .accounts
        .authenticate(&form.username, &form.password, &form.captcha_response, remote_ip)
        .await?;
    Ok(Json(user))
}

pub async fn category_forest(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<TreeNode<Category>>>> {
    Ok(Json(state.categories.forest().await?))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<CategoryPage>> {
    let category = state.categories.get_by_slug(&slug).await?;
    let ancestors = state.categories.ancestors_of(category.id).await?;
    let children = state.categories.children_of(Some(category.id)).await?;
    Ok(Json(CategoryPage {
        category,
        ancestors,
        children,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, OPENMETRICS)], body).into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn published(state: &AppState, slug: &str) -> Result<Post, DomainError> {
    let post = state.posts.get_by_slug(slug).await?;
    if post.status != PublicationStatus::Published {
        return Err(DomainError::not_found("post", slug));
    }
    Ok(post)
}
