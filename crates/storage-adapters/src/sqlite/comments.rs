use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::tree::{comment_key, placement_among};
use domains::{
    Comment, CommentRecord, CommentRepository, DomainError, PublicationStatus, Result,
    TreePosition,
};
use sqlx::sqlite::SqlitePool;
use sqlx::{SqliteConnection, SqliteExecutor};
use uuid::Uuid;

use super::deletion::delete_row;
use super::nested_set::{Forest, COMMENTS};
use super::{corrupt, storage_err};

const COLUMNS: &str = "id, post_id, author_id, content, created_at, updated_at, status, parent_id, \
                       tree_id, lft, rght, level";

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    author_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    status: String,
    parent_id: Option<Uuid>,
    tree_id: i64,
    lft: i64,
    rght: i64,
    level: i64,
}

impl TryFrom<CommentRow> for Comment {
    type Error = DomainError;

    fn try_from(row: CommentRow) -> Result<Self> {
        Ok(Comment {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
            status: row
                .status
                .parse::<PublicationStatus>()
                .map_err(|e| corrupt("comment status", e))?,
            parent_id: row.parent_id,
            position: TreePosition {
                tree_id: row.tree_id,
                lft: row.lft,
                rght: row.rght,
                level: row.level,
            },
        })
    }
}

fn convert(rows: Vec<CommentRow>) -> Result<Vec<Comment>> {
    rows.into_iter().map(Comment::try_from).collect()
}

pub struct SqliteCommentRepository {
    pool: SqlitePool,
}

impl SqliteCommentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn fetch<'e>(exec: impl SqliteExecutor<'e>, id: Uuid) -> Result<Option<Comment>> {
    let sql = format!("SELECT {COLUMNS} FROM comments WHERE id = ?");
    sqlx::query_as::<_, CommentRow>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(storage_err)?
        .map(Comment::try_from)
        .transpose()
}

/// Siblings of a new comment, itself excluded. Top-level comments are
/// siblings only within their own post.
async fn siblings(
    conn: &mut SqliteConnection,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    id: Uuid,
) -> Result<Vec<Comment>> {
    let sql = match parent_id {
        Some(_) => format!(
            "SELECT {COLUMNS} FROM comments WHERE parent_id = ?1 AND id != ?3 ORDER BY lft"
        ),
        None => format!(
            "SELECT {COLUMNS} FROM comments \
             WHERE post_id = ?2 AND parent_id IS NULL AND id != ?3 AND tree_id > 0 \
             ORDER BY tree_id"
        ),
    };
    let rows = sqlx::query_as::<_, CommentRow>(&sql)
        .bind(parent_id)
        .bind(post_id)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(storage_err)?;
    convert(rows)
}

#[async_trait]
impl CommentRepository for SqliteCommentRepository {
    async fn insert(&self, record: CommentRecord) -> Result<Comment> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        // 1. Insert the row already parked
        let parked = Forest::parked_leaf();
        sqlx::query(
            "INSERT INTO comments (id, post_id, author_id, content, created_at, updated_at, status, \
             parent_id, tree_id, lft, rght, level) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(record.post_id)
        .bind(record.author_id)
        .bind(&record.content)
        .bind(record.created_at)
        .bind(record.created_at)
        .bind(record.status.as_str())
        .bind(record.parent_id)
        .bind(parked.tree_id)
        .bind(parked.lft)
        .bind(parked.rght)
        .bind(parked.level)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        // 2. Newest first among its siblings
        let parent = match record.parent_id {
            Some(pid) => {
                let parent = fetch(&mut *tx, pid).await?.ok_or_else(|| {
                    DomainError::validation("parent_id", format!("comment {pid} does not exist"))
                })?;
                if parent.post_id != record.post_id {
                    return Err(DomainError::validation(
                        "parent_id",
                        "a reply must belong to the same post as its parent",
                    ));
                }
                Some(parent.position)
            }
            None => None,
        };
        let siblings = siblings(&mut tx, record.post_id, record.parent_id, record.id).await?;
        let placement =
            placement_among(&siblings, &comment_key(record.created_at, record.id), parent);
        COMMENTS.attach(&mut tx, parked, placement).await?;

        let comment = fetch(&mut *tx, record.id)
            .await?
            .ok_or_else(|| DomainError::not_found("comment", record.id))?;
        tx.commit().await.map_err(storage_err)?;
        Ok(comment)
    }

    async fn update_content(
        &self,
        id: Uuid,
        content: String,
        status: PublicationStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Comment> {
        let updated = sqlx::query(
            "UPDATE comments SET content = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&content)
        .bind(status.as_str())
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?
        .rows_affected();
        if updated == 0 {
            return Err(DomainError::not_found("comment", id));
        }
        fetch(&self.pool, id)
            .await?
            .ok_or_else(|| DomainError::not_found("comment", id))
    }

    async fn delete(&self, id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let removed = delete_row(&mut tx, "comments", id).await?;
        if removed == 0 {
            return Err(DomainError::not_found("comment", id));
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(removed)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Comment>> {
        fetch(&self.pool, id).await
    }

    async fn children_of(&self, post_id: Uuid, parent: Option<Uuid>) -> Result<Vec<Comment>> {
        let rows = match parent {
            Some(pid) => {
                let sql = format!(
                    "SELECT {COLUMNS} FROM comments WHERE post_id = ? AND parent_id = ? ORDER BY lft"
                );
                sqlx::query_as::<_, CommentRow>(&sql)
                    .bind(post_id)
                    .bind(pid)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {COLUMNS} FROM comments \
                     WHERE post_id = ? AND parent_id IS NULL ORDER BY tree_id"
                );
                sqlx::query_as::<_, CommentRow>(&sql)
                    .bind(post_id)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(storage_err)?;
        convert(rows)
    }

    async fn descendants_of(&self, id: Uuid) -> Result<Vec<Comment>> {
        let pos = fetch(&self.pool, id)
            .await?
            .ok_or_else(|| DomainError::not_found("comment", id))?
            .position;
        let sql = format!(
            "SELECT {COLUMNS} FROM comments WHERE tree_id = ? AND lft > ? AND lft < ? ORDER BY lft"
        );
        let rows = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(pos.tree_id)
            .bind(pos.lft)
            .bind(pos.rght)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        convert(rows)
    }

    async fn thread(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM comments WHERE post_id = ? AND tree_id > 0 ORDER BY tree_id, lft"
        );
        let rows = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        convert(rows)
    }
}
