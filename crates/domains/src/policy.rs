//! Per-relationship deletion policies.
//!
//! Deleting a record never relies on implicit database behaviour: the
//! repository looks up the policy of every relation pointing at the record
//! and applies it in the same transaction as the delete.

/// What happens to referencing rows when the referenced row goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Delete the referencing rows too.
    Cascade,
    /// Refuse the delete while references exist.
    Protect,
    /// Clear the reference.
    Nullify,
    /// Point the reference at the system user.
    SetDefault,
}

/// Every foreign-key style relation in the model, named `Referrer → target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    PostCategory,
    CategoryParent,
    PostAuthor,
    PostUpdater,
    CommentPost,
    CommentAuthor,
    CommentParent,
    RatingPost,
    RatingUser,
    ProfileUser,
}

impl Relation {
    pub const ALL: [Relation; 10] = [
        Relation::PostCategory,
        Relation::CategoryParent,
        Relation::PostAuthor,
        Relation::PostUpdater,
        Relation::CommentPost,
        Relation::CommentAuthor,
        Relation::CommentParent,
        Relation::RatingPost,
        Relation::RatingUser,
        Relation::ProfileUser,
    ];

    pub fn on_delete(self) -> DeletionPolicy {
        match self {
            Relation::PostCategory => DeletionPolicy::Protect,
            Relation::PostAuthor => DeletionPolicy::SetDefault,
            Relation::PostUpdater => DeletionPolicy::Nullify,
            Relation::CategoryParent
            | Relation::CommentPost
            | Relation::CommentAuthor
            | Relation::CommentParent
            | Relation::RatingPost
            | Relation::RatingUser
            | Relation::ProfileUser => DeletionPolicy::Cascade,
        }
    }

    /// Relations whose target is a user account.
    pub fn targets_user(self) -> bool {
        matches!(
            self,
            Relation::PostAuthor
                | Relation::PostUpdater
                | Relation::CommentAuthor
                | Relation::RatingUser
                | Relation::ProfileUser
        )
    }
}
