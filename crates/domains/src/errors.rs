//! # DomainError
//!
//! Centralized error handling for the Inkwell ecosystem.
//! Every port and service returns this type so callers can react to the
//! failure class (bad input, duplicate, in-use, credentials, CAPTCHA).

use std::fmt;

use thiserror::Error;

/// Storage-level uniqueness constraints the core relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    PostSlug,
    CategorySlug,
    UserEmail,
    Username,
    /// One vote per (post, originating address).
    RatingAddress,
}

impl Constraint {
    /// Form field the constraint is reported against.
    pub fn field(self) -> &'static str {
        match self {
            Self::PostSlug | Self::CategorySlug => "slug",
            Self::UserEmail => "email",
            Self::Username => "username",
            Self::RatingAddress => "ip_address",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PostSlug => "post slug",
            Self::CategorySlug => "category slug",
            Self::UserEmail => "user email",
            Self::Username => "username",
            Self::RatingAddress => "vote for this post from this address",
        };
        f.write_str(name)
    }
}

/// The primary error type for all domain operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Malformed or non-unique input, scoped to the offending field.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// A uniqueness constraint rejected the write (e.g. a second vote).
    #[error("already exists: {0}")]
    Conflict(Constraint),

    /// The record is still referenced and the relation protects it.
    #[error("still referenced: {0}")]
    Referential(String),

    /// Bad username/password pair.
    #[error("invalid credentials")]
    Auth,

    /// CAPTCHA rejected, timed out or the verifier was unreachable.
    #[error("challenge failed: {0}")]
    Challenge(String),

    /// Resource not found (e.g., Post, Category, User)
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Infrastructure failure (e.g., DB down, disk full)
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether this is a uniqueness failure on the given constraint.
    pub fn is_conflict_on(&self, constraint: Constraint) -> bool {
        matches!(self, Self::Conflict(c) if *c == constraint)
    }
}

/// A specialized Result type for Inkwell logic.
pub type Result<T> = std::result::Result<T, DomainError>;
