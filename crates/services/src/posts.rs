//! Post lifecycle: validation, slug assignment, thumbnails and the public
//! (published only) views.

use std::sync::Arc;

use chrono::Utc;
use domains::validation::{self, POST_DESCRIPTION_MAX, TITLE_MAX};
use domains::{
    CategoryRepository, Constraint, DomainError, MediaKind, MediaStorage, NewPost, Post,
    PostFilter, PostRepository, PostUpdate, PostView, PublicationStatus, Result,
    DEFAULT_THUMBNAIL,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ratings::RatingLedger;
use crate::slug::{slug_exhausted, PostSlugs, SlugGenerator, LATE_CONFLICT_RETRIES};

/// Public listing parameters as they arrive from the rendering layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostQuery {
    /// Category slug; the listing includes its descendant categories.
    pub category: Option<String>,
    pub tag: Option<String>,
    /// 1-based; 0 is treated as the first page.
    #[serde(default)]
    pub page: u32,
}

/// A published post as shown on its own page.
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub view: PostView,
    pub thumbnail_url: String,
    pub score: i64,
}

pub struct PostService {
    posts: Arc<dyn PostRepository>,
    categories: Arc<dyn CategoryRepository>,
    ledger: Arc<RatingLedger>,
    media: Arc<dyn MediaStorage>,
    slugs: SlugGenerator,
    page_size: u32,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        ledger: Arc<RatingLedger>,
        media: Arc<dyn MediaStorage>,
        slugs: SlugGenerator,
        page_size: u32,
    ) -> Self {
        Self {
            posts,
            categories,
            ledger,
            media,
            slugs,
            page_size: page_size.max(1),
        }
    }

    pub async fn create(&self, author_id: Uuid, input: NewPost) -> Result<Post> {
        validate_fields(&input.title, &input.description)?;
        let tags = validation::normalize_tags(&input.tags)?;
        self.ensure_category(input.category_id).await?;

        let now = Utc::now();
        let thumbnail = match input.thumbnail {
            Some(upload) => self.media.store(MediaKind::Thumbnail, upload, now).await?,
            None => DEFAULT_THUMBNAIL.to_string(),
        };

        let id = Uuid::now_v7();
        let title = input.title.trim().to_string();
        for _ in 0..=LATE_CONFLICT_RETRIES {
            let slug = self
                .slugs
                .generate(&PostSlugs(self.posts.as_ref()), &title, input.slug.as_deref(), None)
                .await?;
            let post = Post {
                id,
                title: title.clone(),
                slug,
                description: input.description.clone(),
                text: input.text.clone(),
                thumbnail: thumbnail.clone(),
                status: input.status,
                created_at: now,
                updated_at: now,
                author_id,
                updater_id: None,
                fixed: input.fixed,
                category_id: input.category_id,
                tags: tags.clone(),
            };
            match self.posts.insert(post).await {
                Ok(post) => {
                    info!(post_id = %post.id, slug = %post.slug, status = %post.status, "post created");
                    return Ok(post);
                }
                Err(e) if e.is_conflict_on(Constraint::PostSlug) => {
                    warn!(%title, "post slug taken concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(slug_exhausted(&title))
    }

    /// Saves an edit made by `updater_id`. The slug is re-derived only when
    /// the title changed and no explicit slug was given; thumbnail and tags
    /// keep their stored values when omitted.
    pub async fn update(&self, id: Uuid, updater_id: Uuid, input: PostUpdate) -> Result<Post> {
        let current = self.get(id).await?;
        validate_fields(&input.title, &input.description)?;
        let tags = match &input.tags {
            Some(tags) => validation::normalize_tags(tags)?,
            None => current.tags.clone(),
        };
        if input.category_id != current.category_id {
            self.ensure_category(input.category_id).await?;
        }

        let now = Utc::now();
        let thumbnail = match input.thumbnail {
            Some(upload) => self.media.store(MediaKind::Thumbnail, upload, now).await?,
            None => current.thumbnail.clone(),
        };

        let title = input.title.trim().to_string();
        let requested = input.slug.as_deref().filter(|s| !s.trim().is_empty());
        for _ in 0..=LATE_CONFLICT_RETRIES {
            let slug = if requested.is_none() && title == current.title {
                current.slug.clone()
            } else {
                self.slugs
                    .generate(&PostSlugs(self.posts.as_ref()), &title, requested, Some(id))
                    .await?
            };
            let post = Post {
                id,
                title: title.clone(),
                slug,
                description: input.description.clone(),
                text: input.text.clone(),
                thumbnail: thumbnail.clone(),
                status: input.status,
                created_at: current.created_at,
                updated_at: now,
                author_id: current.author_id,
                updater_id: Some(updater_id),
                fixed: input.fixed,
                category_id: input.category_id,
                tags: tags.clone(),
            };
            match self.posts.update(post).await {
                Ok(post) => {
                    info!(post_id = %id, %updater_id, "post updated");
                    return Ok(post);
                }
                Err(e) if e.is_conflict_on(Constraint::PostSlug) => {
                    warn!(post_id = %id, "post slug taken concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(slug_exhausted(&title))
    }

    /// Published posts, pinned first, then newest first.
    pub async fn list_published(&self, query: PostQuery) -> Result<Vec<PostView>> {
        let category_id = match query.category.as_deref() {
            Some(slug) => Some(
                self.categories
                    .get_by_slug(slug)
                    .await?
                    .ok_or_else(|| DomainError::not_found("category", slug))?
                    .id,
            ),
            None => None,
        };
        let page = query.page.max(1);
        let filter = PostFilter {
            category_id,
            tag: query.tag.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            limit: self.page_size,
            offset: (page - 1).saturating_mul(self.page_size),
        };
        self.posts.list_published(filter).await
    }

    /// A single published post with its score. Drafts are reported as
    /// missing.
    pub async fn get_published(&self, slug: &str) -> Result<PostDetail> {
        let view = self
            .posts
            .view_by_slug(slug)
            .await?
            .filter(|v| v.post.status == PublicationStatus::Published)
            .ok_or_else(|| DomainError::not_found("post", slug))?;
        let score = self.ledger.score_of(view.post.id).await?;
        let thumbnail_url = self.media.url_for(&view.post.thumbnail);
        Ok(PostDetail {
            view,
            thumbnail_url,
            score,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Post> {
        self.posts
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("post", id))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Post> {
        self.posts
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::not_found("post", slug))
    }

    /// Deletes the post along with its comments, ratings and tag links.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.get(id).await?;
        self.posts.delete(id).await?;
        info!(post_id = %id, "post deleted");
        Ok(())
    }

    pub async fn aggregate_score(&self, id: Uuid) -> Result<i64> {
        self.ledger.score_of(id).await
    }

    async fn ensure_category(&self, category_id: Uuid) -> Result<()> {
        match self.categories.get(category_id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::validation(
                "category",
                format!("category {category_id} does not exist"),
            )),
        }
    }
}

fn validate_fields(title: &str, description: &str) -> Result<()> {
    validation::required("title", title)?;
    validation::max_chars("title", title, TITLE_MAX)?;
    validation::max_chars("description", description, POST_DESCRIPTION_MAX)
}
