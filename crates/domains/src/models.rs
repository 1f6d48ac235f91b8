//! # Domain Models
//!
//! These structs represent the core entities of Inkwell.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::tree::TreePosition;

/// Owner of posts whose author account was deleted.
pub const SYSTEM_USER_ID: Uuid = Uuid::from_u128(1);

/// Thumbnail reference used when a post is saved without an image.
pub const DEFAULT_THUMBNAIL: &str = "default.jpg";

/// Visibility of posts and comments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    #[default]
    Published,
    Draft,
}

impl PublicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Draft => "draft",
        }
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published" => Ok(Self::Published),
            "draft" => Ok(Self::Draft),
            other => Err(DomainError::validation(
                "status",
                format!("unknown status `{other}`"),
            )),
        }
    }
}

/// A node of the category forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub title: String,
    /// The URL slug (e.g., "tech" for /categories/tech)
    pub slug: String,
    pub description: String,
    pub parent_id: Option<Uuid>,
    #[serde(skip)]
    pub position: TreePosition,
}

/// Input for creating a category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCategory {
    pub title: String,
    /// Explicit slug; derived from the title when absent.
    pub slug: Option<String>,
    pub description: String,
    pub parent_id: Option<Uuid>,
}

/// Full replacement of a category's editable fields. Changing `parent_id`
/// moves the node (and its subtree) within the forest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryUpdate {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
    pub parent_id: Option<Uuid>,
}

/// Category row as handed to the repository: slug already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub parent_id: Option<Uuid>,
}

/// A blog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub text: String,
    /// Media reference handed out by `MediaStorage`.
    pub thumbnail: String,
    pub status: PublicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_id: Uuid,
    pub updater_id: Option<Uuid>,
    /// Pinned posts are listed before everything else.
    pub fixed: bool,
    pub category_id: Uuid,
    pub tags: Vec<String>,
}

/// An uploaded file before it reaches `MediaStorage`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpload {
    /// Client-side file name; its extension decides the accepted format.
    pub file_name: String,
    pub data: Bytes,
}

/// Which upload area a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Thumbnail,
    Avatar,
}

impl MediaKind {
    pub fn directory(self) -> &'static str {
        match self {
            Self::Thumbnail => "images/thumbnails",
            Self::Avatar => "images/avatars",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
    pub text: String,
    pub category_id: Uuid,
    pub status: PublicationStatus,
    pub fixed: bool,
    pub thumbnail: Option<MediaUpload>,
    pub tags: Vec<String>,
}

/// Editable post fields. `thumbnail` and `tags` keep their stored values
/// when left as `None`.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
    pub text: String,
    pub category_id: Uuid,
    pub status: PublicationStatus,
    pub fixed: bool,
    pub thumbnail: Option<MediaUpload>,
    pub tags: Option<Vec<String>>,
}

/// Author columns joined into public listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub username: String,
}

/// Category columns joined into public listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
}

/// A post joined with its author and category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author: AuthorSummary,
    pub category: CategorySummary,
}

/// Filters for the public post listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFilter {
    /// Restrict to this category and all of its descendants.
    pub category_id: Option<Uuid>,
    pub tag: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// A node of a post's comment forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: PublicationStatus,
    pub parent_id: Option<Uuid>,
    #[serde(skip)]
    pub position: TreePosition,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewComment {
    pub post_id: Uuid,
    pub content: String,
    /// Reply target; must belong to the same post.
    pub parent_id: Option<Uuid>,
}

/// Comment row as handed to the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: PublicationStatus,
    pub parent_id: Option<Uuid>,
}

/// Like or dislike. Stored as +1 / -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum RatingValue {
    Like,
    Dislike,
}

impl RatingValue {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Like => 1,
            Self::Dislike => -1,
        }
    }
}

impl From<RatingValue> for i64 {
    fn from(value: RatingValue) -> Self {
        value.as_i64()
    }
}

impl TryFrom<i64> for RatingValue {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Like),
            -1 => Ok(Self::Dislike),
            other => Err(DomainError::validation(
                "value",
                format!("a vote is +1 or -1, got {other}"),
            )),
        }
    }
}

/// One recorded vote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rating {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Option<Uuid>,
    pub value: RatingValue,
    pub created_at: DateTime<Utc>,
    pub ip_address: IpAddr,
}

/// Base identity. `password_hash` is a PHC string and never serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// User row as handed to the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Sign-up form input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub password_confirmation: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountUpdate {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Profile attributes extending a `User`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub birth_date: Option<NaiveDate>,
    pub bio: String,
    pub avatar: Option<String>,
}

impl Profile {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            birth_date: None,
            bio: String::new(),
            avatar: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub birth_date: Option<NaiveDate>,
    pub bio: String,
    /// Keeps the current avatar when `None`.
    pub avatar: Option<MediaUpload>,
}
