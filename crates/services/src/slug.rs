//! Unique slug generation.
//!
//! The lookup is advisory: two writers can pick the same free slug at the
//! same time. The unique index in the store decides, and callers re-run the
//! generator when the write comes back with a slug conflict.

use async_trait::async_trait;
use domains::slug::{slugify, with_suffix};
use domains::{CategoryRepository, DomainError, PostRepository, Result};
use tracing::{debug, warn};
use uuid::Uuid;

/// Times a service re-generates after the store rejected its slug.
pub const LATE_CONFLICT_RETRIES: usize = 3;

/// Random suffixes tried once the numbered candidates are used up.
const RANDOM_ATTEMPTS: u32 = 3;

/// Read-only slug lookup for one entity type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SlugIndex: Send + Sync {
    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool>;
}

/// Slug lookups against the category table.
pub struct CategorySlugs<'a>(pub &'a dyn CategoryRepository);

#[async_trait]
impl SlugIndex for CategorySlugs<'_> {
    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool> {
        self.0.slug_taken(slug, exclude).await
    }
}

/// Slug lookups against the post table.
pub struct PostSlugs<'a>(pub &'a dyn PostRepository);

#[async_trait]
impl SlugIndex for PostSlugs<'_> {
    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool> {
        self.0.slug_taken(slug, exclude).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlugGenerator {
    /// Numbered candidates tried, the bare slug included.
    max_attempts: u32,
}

impl Default for SlugGenerator {
    fn default() -> Self {
        Self { max_attempts: 20 }
    }
}

impl SlugGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Picks a slug for a record titled `title`. A non-blank `requested`
    /// slug wins over the title as the base. `exclude` is the id of the record
    /// being saved so it never collides with itself.
    ///
    /// Tries `base`, `base-2`, `base-3`, ... then a few random suffixes,
    /// and fails with a `slug` validation error when all are taken.
    pub async fn generate(
        &self,
        index: &dyn SlugIndex,
        title: &str,
        requested: Option<&str>,
        exclude: Option<Uuid>,
    ) -> Result<String> {
        let mut base = requested.map(slugify).unwrap_or_default();
        if base.is_empty() {
            base = slugify(title);
        }
        if base.is_empty() {
            base = random_token();
        }

        if !index.slug_taken(&base, exclude).await? {
            return Ok(base);
        }
        for n in 2..=self.max_attempts {
            let candidate = with_suffix(&base, &n.to_string());
            if !index.slug_taken(&candidate, exclude).await? {
                return Ok(candidate);
            }
        }
        for _ in 0..RANDOM_ATTEMPTS {
            let candidate = with_suffix(&base, &random_token());
            if !index.slug_taken(&candidate, exclude).await? {
                debug!(%base, %candidate, "numbered slugs exhausted, using random suffix");
                return Ok(candidate);
            }
        }

        warn!(%base, "no free slug found");
        Err(slug_exhausted(&base))
    }
}

pub(crate) fn slug_exhausted(base: &str) -> DomainError {
    DomainError::validation("slug", format!("could not find a free slug for `{base}`"))
}

fn random_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}
