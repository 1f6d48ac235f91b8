//! inkwell/crates/services/src/lib.rs
//!
//! Application services. Each one orchestrates the domain ports for a single
//! area of the blog and owns the rules that do not belong to storage:
//! validation, slug assignment, timestamps and collaborator calls.

pub mod accounts;
pub mod categories;
pub mod comments;
pub mod posts;
pub mod ratings;
pub mod slug;

pub use accounts::AccountService;
pub use categories::CategoryService;
pub use comments::CommentService;
pub use posts::{PostDetail, PostQuery, PostService};
pub use ratings::RatingLedger;
pub use slug::SlugGenerator;
