use async_trait::async_trait;
use domains::tree::{category_key, placement_among};
use domains::{Category, CategoryRecord, CategoryRepository, DomainError, Result, TreePosition};
use sqlx::sqlite::SqlitePool;
use sqlx::{SqliteConnection, SqliteExecutor};
use uuid::Uuid;

use super::deletion::delete_row;
use super::nested_set::{Forest, CATEGORIES};
use super::storage_err;

const COLUMNS: &str = "id, title, slug, description, parent_id, tree_id, lft, rght, level";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    title: String,
    slug: String,
    description: String,
    parent_id: Option<Uuid>,
    tree_id: i64,
    lft: i64,
    rght: i64,
    level: i64,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            title: row.title,
            slug: row.slug,
            description: row.description,
            parent_id: row.parent_id,
            position: TreePosition {
                tree_id: row.tree_id,
                lft: row.lft,
                rght: row.rght,
                level: row.level,
            },
        }
    }
}

pub struct SqliteCategoryRepository {
    pool: SqlitePool,
}

impl SqliteCategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, bind: Option<Uuid>) -> Result<Vec<Category>> {
        let mut query = sqlx::query_as::<_, CategoryRow>(sql);
        if let Some(id) = bind {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(storage_err)?;
        Ok(rows.into_iter().map(Category::from).collect())
    }
}

async fn fetch<'e>(exec: impl SqliteExecutor<'e>, id: Uuid) -> Result<Option<Category>> {
    let sql = format!("SELECT {COLUMNS} FROM categories WHERE id = ?");
    let row = sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(storage_err)?;
    Ok(row.map(Category::from))
}

/// Siblings the node will be placed among, `id` itself excluded.
async fn siblings(
    conn: &mut SqliteConnection,
    parent_id: Option<Uuid>,
    id: Uuid,
) -> Result<Vec<Category>> {
    let sql = match parent_id {
        Some(_) => format!(
            "SELECT {COLUMNS} FROM categories WHERE parent_id = ?1 AND id != ?2 ORDER BY lft"
        ),
        None => format!(
            "SELECT {COLUMNS} FROM categories \
             WHERE parent_id IS NULL AND id != ?2 AND tree_id > 0 ORDER BY tree_id"
        ),
    };
    let rows = sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(parent_id)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(storage_err)?;
    Ok(rows.into_iter().map(Category::from).collect())
}

/// Attaches the parked subtree rooted at `id` under `parent_id`, ordered by
/// title among the siblings found there.
async fn place(
    conn: &mut SqliteConnection,
    parked: TreePosition,
    id: Uuid,
    title: &str,
    parent_id: Option<Uuid>,
) -> Result<()> {
    let parent = match parent_id {
        Some(pid) => Some(
            CATEGORIES
                .position(conn, pid)
                .await?
                .ok_or_else(|| missing_parent(pid))?,
        ),
        None => None,
    };
    let siblings = siblings(conn, parent_id, id).await?;
    let placement = placement_among(&siblings, &category_key(title, id), parent);
    CATEGORIES.attach(conn, parked, placement).await
}

fn missing_parent(id: Uuid) -> DomainError {
    DomainError::validation("parent_id", format!("category {id} does not exist"))
}

#[async_trait]
impl CategoryRepository for SqliteCategoryRepository {
    async fn insert(&self, record: CategoryRecord) -> Result<Category> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        // 1. Insert the row already parked
        let parked = Forest::parked_leaf();
        sqlx::query(
            "INSERT INTO categories (id, title, slug, description, parent_id, tree_id, lft, rght, level) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(&record.title)
        .bind(&record.slug)
        .bind(&record.description)
        .bind(record.parent_id)
        .bind(parked.tree_id)
        .bind(parked.lft)
        .bind(parked.rght)
        .bind(parked.level)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        // 2. Attach it among its siblings
        place(&mut tx, parked, record.id, &record.title, record.parent_id).await?;

        let category = fetch(&mut *tx, record.id)
            .await?
            .ok_or_else(|| DomainError::not_found("category", record.id))?;
        tx.commit().await.map_err(storage_err)?;
        Ok(category)
    }

    async fn update(&self, record: CategoryRecord) -> Result<Category> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let current = fetch(&mut *tx, record.id)
            .await?
            .ok_or_else(|| DomainError::not_found("category", record.id))?;
        if let Some(pid) = record.parent_id {
            let parent = CATEGORIES
                .position(&mut tx, pid)
                .await?
                .ok_or_else(|| missing_parent(pid))?;
            if current.position.contains(&parent) {
                return Err(DomainError::validation(
                    "parent_id",
                    "a category cannot be moved below itself or its descendants",
                ));
            }
        }

        sqlx::query(
            "UPDATE categories SET title = ?, slug = ?, description = ?, parent_id = ? WHERE id = ?",
        )
        .bind(&record.title)
        .bind(&record.slug)
        .bind(&record.description)
        .bind(record.parent_id)
        .bind(record.id)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if current.parent_id != record.parent_id || current.title != record.title {
            let parked = CATEGORIES.park(&mut tx, current.position).await?;
            place(&mut tx, parked, record.id, &record.title, record.parent_id).await?;
        }

        let category = fetch(&mut *tx, record.id)
            .await?
            .ok_or_else(|| DomainError::not_found("category", record.id))?;
        tx.commit().await.map_err(storage_err)?;
        Ok(category)
    }

    async fn delete(&self, id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let removed = delete_row(&mut tx, "categories", id).await?;
        if removed == 0 {
            return Err(DomainError::not_found("category", id));
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(removed)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Category>> {
        fetch(&self.pool, id).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {COLUMNS} FROM categories WHERE slug = ?");
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Category::from))
    }

    async fn children_of(&self, parent: Option<Uuid>) -> Result<Vec<Category>> {
        match parent {
            Some(id) => {
                let sql =
                    format!("SELECT {COLUMNS} FROM categories WHERE parent_id = ? ORDER BY lft");
                self.fetch_many(&sql, Some(id)).await
            }
            None => {
                let sql = format!(
                    "SELECT {COLUMNS} FROM categories WHERE parent_id IS NULL ORDER BY tree_id"
                );
                self.fetch_many(&sql, None).await
            }
        }
    }

    async fn descendants_of(&self, id: Uuid) -> Result<Vec<Category>> {
        let pos = self
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("category", id))?
            .position;
        let sql = format!(
            "SELECT {COLUMNS} FROM categories \
             WHERE tree_id = ? AND lft > ? AND lft < ? ORDER BY lft"
        );
        let rows = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(pos.tree_id)
            .bind(pos.lft)
            .bind(pos.rght)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn ancestors_of(&self, id: Uuid) -> Result<Vec<Category>> {
        let pos = self
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("category", id))?
            .position;
        let sql = format!(
            "SELECT {COLUMNS} FROM categories \
             WHERE tree_id = ? AND lft < ? AND rght > ? ORDER BY lft"
        );
        let rows = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(pos.tree_id)
            .bind(pos.lft)
            .bind(pos.rght)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn all(&self) -> Result<Vec<Category>> {
        let sql = format!("SELECT {COLUMNS} FROM categories WHERE tree_id > 0 ORDER BY tree_id, lft");
        self.fetch_many(&sql, None).await
    }

    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM categories WHERE slug = ?1 AND (?2 IS NULL OR id != ?2)",
        )
        .bind(slug)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count > 0)
    }
}
