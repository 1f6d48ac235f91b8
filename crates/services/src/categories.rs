//! Category tree service.
//!
//! Categories form a forest ordered by title. Placement and the cycle guard
//! are enforced again by the repository inside its transaction; the checks
//! here exist to report a precise field error before any write happens.

use std::sync::Arc;

use domains::tree::build_forest;
use domains::validation::{self, CATEGORY_DESCRIPTION_MAX, TITLE_MAX};
use domains::{
    Category, CategoryRecord, CategoryRepository, CategoryUpdate, Constraint, DomainError,
    NewCategory, Result, TreeNode,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::slug::{slug_exhausted, CategorySlugs, SlugGenerator, LATE_CONFLICT_RETRIES};

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    slugs: SlugGenerator,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, slugs: SlugGenerator) -> Self {
        Self { repo, slugs }
    }

    pub async fn create(&self, input: NewCategory) -> Result<Category> {
        validate_fields(&input.title, &input.description)?;
        if let Some(parent_id) = input.parent_id {
            self.existing_parent(parent_id).await?;
        }

        let id = Uuid::now_v7();
        for _ in 0..=LATE_CONFLICT_RETRIES {
            let slug = self
                .slugs
                .generate(
                    &CategorySlugs(self.repo.as_ref()),
                    &input.title,
                    input.slug.as_deref(),
                    None,
                )
                .await?;
            let record = CategoryRecord {
                id,
                title: input.title.trim().to_string(),
                slug,
                description: input.description.clone(),
                parent_id: input.parent_id,
            };
            match self.repo.insert(record).await {
                Ok(category) => {
                    info!(category_id = %category.id, slug = %category.slug, "category created");
                    return Ok(category);
                }
                Err(e) if e.is_conflict_on(Constraint::CategorySlug) => {
                    warn!(title = %input.title, "category slug taken concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(slug_exhausted(&input.title))
    }

    /// Replaces the editable fields. A new `parent_id` moves the whole
    /// subtree; a new title re-places the node among its siblings.
    pub async fn update(&self, id: Uuid, input: CategoryUpdate) -> Result<Category> {
        let current = self.get(id).await?;
        validate_fields(&input.title, &input.description)?;

        if let Some(parent_id) = input.parent_id {
            if parent_id == id {
                return Err(DomainError::validation(
                    "parent_id",
                    "a category cannot be its own parent",
                ));
            }
            let parent = self.existing_parent(parent_id).await?;
            if current.position.contains(&parent.position) {
                return Err(DomainError::validation(
                    "parent_id",
                    "a category cannot be moved below one of its descendants",
                ));
            }
        }

        let title = input.title.trim().to_string();
        let requested = input.slug.as_deref().filter(|s| !s.trim().is_empty());
        for _ in 0..=LATE_CONFLICT_RETRIES {
            let slug = if requested.is_none() && title == current.title {
                current.slug.clone()
            } else {
                self.slugs
                    .generate(&CategorySlugs(self.repo.as_ref()), &title, requested, Some(id))
                    .await?
            };
            let record = CategoryRecord {
                id,
                title: title.clone(),
                slug,
                description: input.description.clone(),
                parent_id: input.parent_id,
            };
            match self.repo.update(record).await {
                Ok(category) => {
                    info!(category_id = %id, "category updated");
                    return Ok(category);
                }
                Err(e) if e.is_conflict_on(Constraint::CategorySlug) => {
                    warn!(category_id = %id, "category slug taken concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(slug_exhausted(&title))
    }

    /// Removes the category with its whole subtree. Refused while any post
    /// is filed under one of them.
    pub async fn delete(&self, id: Uuid) -> Result<u64> {
        match self.repo.delete(id).await {
            Ok(removed) => {
                info!(category_id = %id, removed, "category subtree deleted");
                Ok(removed)
            }
            Err(e) => {
                warn!(category_id = %id, error = %e, "category delete rejected");
                Err(e)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Category> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("category", id))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category> {
        self.repo
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::not_found("category", slug))
    }

    /// Direct children in title order; `None` lists the roots.
    pub async fn children_of(&self, parent: Option<Uuid>) -> Result<Vec<Category>> {
        if let Some(id) = parent {
            self.get(id).await?;
        }
        self.repo.children_of(parent).await
    }

    pub async fn roots(&self) -> Result<Vec<Category>> {
        self.repo.children_of(None).await
    }

    pub async fn descendants_of(&self, id: Uuid) -> Result<Vec<Category>> {
        self.get(id).await?;
        self.repo.descendants_of(id).await
    }

    /// Breadcrumb path from the root down to the parent.
    pub async fn ancestors_of(&self, id: Uuid) -> Result<Vec<Category>> {
        self.get(id).await?;
        self.repo.ancestors_of(id).await
    }

    pub async fn forest(&self) -> Result<Vec<TreeNode<Category>>> {
        Ok(build_forest(self.repo.all().await?))
    }

    async fn existing_parent(&self, parent_id: Uuid) -> Result<Category> {
        self.repo.get(parent_id).await?.ok_or_else(|| {
            DomainError::validation("parent_id", format!("category {parent_id} does not exist"))
        })
    }
}

fn validate_fields(title: &str, description: &str) -> Result<()> {
    validation::required("title", title)?;
    validation::max_chars("title", title, TITLE_MAX)?;
    validation::max_chars("description", description, CATEGORY_DESCRIPTION_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockCategoryRepository, TreePosition};

    fn category(title: &str, slug: &str, position: TreePosition) -> Category {
        Category {
            id: Uuid::now_v7(),
            title: title.into(),
            slug: slug.into(),
            description: String::new(),
            parent_id: None,
            position,
        }
    }

    fn stored(record: CategoryRecord) -> Category {
        Category {
            id: record.id,
            title: record.title,
            slug: record.slug,
            description: record.description,
            parent_id: record.parent_id,
            position: TreePosition::root(1),
        }
    }

    fn service(repo: MockCategoryRepository) -> CategoryService {
        CategoryService::new(Arc::new(repo), SlugGenerator::default())
    }

    #[tokio::test]
    async fn test_create_assigns_slug_from_title() {
        let mut repo = MockCategoryRepository::new();
        repo.expect_slug_taken().returning(|slug, _| Ok(slug == "tech"));
        repo.expect_insert().times(1).returning(|r| Ok(stored(r)));

        let created = service(repo)
            .create(NewCategory {
                title: "Tech".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.slug, "tech-2");
    }

    #[tokio::test]
    async fn test_create_retries_after_late_slug_conflict() {
        let mut repo = MockCategoryRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_slug_taken().returning(|_, _| Ok(false));
        repo.expect_insert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(DomainError::Conflict(Constraint::CategorySlug)));
        repo.expect_insert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Ok(stored(r)));

        let created = service(repo)
            .create(NewCategory {
                title: "Tech".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.title, "Tech");
    }

    #[tokio::test]
    async fn test_create_rejects_long_description() {
        let repo = MockCategoryRepository::new();
        let err = service(repo)
            .create(NewCategory {
                title: "Tech".into(),
                description: "x".repeat(301),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "description", .. }));
    }

    #[tokio::test]
    async fn test_create_requires_existing_parent() {
        let mut repo = MockCategoryRepository::new();
        repo.expect_get().returning(|_| Ok(None));

        let err = service(repo)
            .create(NewCategory {
                title: "Rust".into(),
                parent_id: Some(Uuid::now_v7()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "parent_id", .. }));
    }

    #[tokio::test]
    async fn test_update_rejects_move_below_descendant() {
        let root = category("Tech", "tech", TreePosition { tree_id: 1, lft: 1, rght: 4, level: 0 });
        let child = category("Rust", "rust", TreePosition { tree_id: 1, lft: 2, rght: 3, level: 1 });
        let (root_id, child_id) = (root.id, child.id);

        let mut repo = MockCategoryRepository::new();
        repo.expect_get().returning(move |id| {
            Ok(if id == root_id {
                Some(root.clone())
            } else if id == child_id {
                Some(child.clone())
            } else {
                None
            })
        });
        repo.expect_update().never();

        let err = service(repo)
            .update(
                root_id,
                CategoryUpdate {
                    title: "Tech".into(),
                    parent_id: Some(child_id),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "parent_id", .. }));
    }

    #[tokio::test]
    async fn test_update_keeps_slug_when_title_unchanged() {
        let current = category("Tech", "tech", TreePosition::root(1));
        let id = current.id;

        let mut repo = MockCategoryRepository::new();
        repo.expect_get().returning(move |_| Ok(Some(current.clone())));
        repo.expect_slug_taken().never();
        repo.expect_update().returning(|r| Ok(stored(r)));

        let updated = service(repo)
            .update(
                id,
                CategoryUpdate {
                    title: "Tech".into(),
                    description: "All things tech".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.slug, "tech");
        assert_eq!(updated.description, "All things tech");
    }

    #[tokio::test]
    async fn test_get_by_slug_reports_missing() {
        let mut repo = MockCategoryRepository::new();
        repo.expect_get_by_slug().returning(|_| Ok(None));

        let err = service(repo).get_by_slug("nope").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "category", .. }));
    }
}
