//! # Ports
//!
//! Any adapter must implement these traits to be wired into the services.
//! Repositories own atomicity: every method that touches more than one row
//! runs in a single transaction of the underlying store.

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{
    AccountUpdate, Category, CategoryRecord, Comment, CommentRecord, MediaKind, MediaUpload,
    NewUser, Post, PostFilter, PostView, Profile, PublicationStatus, Rating, User,
};

/// Category forest persistence.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Inserts the node under `record.parent_id`, placed among its siblings
    /// by title.
    async fn insert(&self, record: CategoryRecord) -> Result<Category>;
    /// Replaces title/slug/description and re-places the node when its parent
    /// or title changed. Fails with `Validation` when the new parent lies in
    /// the node's own subtree.
    async fn update(&self, record: CategoryRecord) -> Result<Category>;
    /// Deletes the node and its subtree; `Referential` while any post uses
    /// one of them. Returns the number of removed categories.
    async fn delete(&self, id: Uuid) -> Result<u64>;

    async fn get(&self, id: Uuid) -> Result<Option<Category>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;
    /// Direct children in sibling order; `None` lists the roots.
    async fn children_of(&self, parent: Option<Uuid>) -> Result<Vec<Category>>;
    /// Whole subtree below `id`, depth first, excluding `id`.
    async fn descendants_of(&self, id: Uuid) -> Result<Vec<Category>>;
    /// Path from the root down to the parent of `id`.
    async fn ancestors_of(&self, id: Uuid) -> Result<Vec<Category>>;
    /// Every category, depth first.
    async fn all(&self) -> Result<Vec<Category>>;
    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool>;
}

/// Post persistence, including tag links.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert(&self, post: Post) -> Result<Post>;
    async fn update(&self, post: Post) -> Result<Post>;
    /// Removes the post with its comments, ratings and tag links.
    async fn delete(&self, id: Uuid) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Post>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;
    /// The post with its author and category, whatever its status.
    async fn view_by_slug(&self, slug: &str) -> Result<Option<PostView>>;
    /// Published posts joined with author and category, pinned first, then
    /// newest first.
    async fn list_published(&self, filter: PostFilter) -> Result<Vec<PostView>>;
    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool>;
}

/// Comment forests, one per post.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Inserts the node, newest first among its siblings.
    async fn insert(&self, record: CommentRecord) -> Result<Comment>;
    async fn update_content(
        &self,
        id: Uuid,
        content: String,
        status: PublicationStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Comment>;
    /// Deletes the comment and every reply below it. Returns the count.
    async fn delete(&self, id: Uuid) -> Result<u64>;

    async fn get(&self, id: Uuid) -> Result<Option<Comment>>;
    /// Direct children in sibling order; `None` lists the post's top-level
    /// comments.
    async fn children_of(&self, post_id: Uuid, parent: Option<Uuid>) -> Result<Vec<Comment>>;
    async fn descendants_of(&self, id: Uuid) -> Result<Vec<Comment>>;
    /// Every comment of the post, depth first.
    async fn thread(&self, post_id: Uuid) -> Result<Vec<Comment>>;
}

/// Vote storage. The (post, address) uniqueness lives in the store.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// `Conflict(RatingAddress)` when the address already voted on the post.
    async fn insert(&self, rating: Rating) -> Result<Rating>;
    /// Sum of all values, 0 without votes.
    async fn score_of(&self, post_id: Uuid) -> Result<i64>;
    async fn find(&self, post_id: Uuid, address: IpAddr) -> Result<Option<Rating>>;
}

/// User identities and their profiles.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Creates the identity and its empty profile together.
    async fn insert(&self, user: NewUser) -> Result<User>;
    async fn update_account(&self, id: Uuid, update: AccountUpdate) -> Result<User>;
    /// Deletes the user, applying the deletion policy of every relation that
    /// points at users.
    async fn delete(&self, id: Uuid) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    /// Case-insensitive; `exclude` skips the user being edited.
    async fn email_in_use(&self, email: &str, exclude: Option<Uuid>) -> Result<bool>;
    async fn username_in_use(&self, username: &str, exclude: Option<Uuid>) -> Result<bool>;

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>>;
    async fn save_profile(&self, profile: Profile) -> Result<Profile>;
}

/// Media storage contract for post thumbnails and avatars.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Validates and stores the upload under
    /// `<kind directory>/YYYY/MM/DD/<name>` for the day of `at`, returning the
    /// relative reference to persist.
    async fn store(&self, kind: MediaKind, upload: MediaUpload, at: DateTime<Utc>) -> Result<String>;
    /// Public URL for a stored reference.
    fn url_for(&self, reference: &str) -> String;
}

/// Third-party challenge (CAPTCHA) verification.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// `Ok(true)` only when the verifier positively accepted the response.
    /// Transport failures are errors; callers treat both as a failed
    /// challenge.
    async fn verify(&self, response: &str, remote_ip: Option<IpAddr>) -> Result<bool>;
}

/// Password credential hashing.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    /// Returns a self-describing hash string.
    fn hash(&self, password: &str) -> Result<String>;
    /// Never errors: malformed hashes simply don't verify.
    fn verify(&self, password: &str, hash: &str) -> bool;
}
