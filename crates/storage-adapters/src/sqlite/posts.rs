use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AuthorSummary, CategorySummary, DomainError, Post, PostFilter, PostRepository, PostView,
    PublicationStatus, Result,
};
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqliteExecutor};
use uuid::Uuid;

use super::deletion::delete_row;
use super::{corrupt, storage_err};

const COLUMNS: &str = "p.id, p.title, p.slug, p.description, p.text, p.thumbnail, p.status, \
                       p.created_at, p.updated_at, p.author_id, p.updater_id, p.fixed, p.category_id";

const VIEW_JOIN: &str = "u.username AS author_username, c.title AS category_title, \
                         c.slug AS category_slug \
                         FROM posts p \
                         JOIN users u ON u.id = p.author_id \
                         JOIN categories c ON c.id = p.category_id";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    title: String,
    slug: String,
    description: String,
    text: String,
    thumbnail: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_id: Uuid,
    updater_id: Option<Uuid>,
    fixed: bool,
    category_id: Uuid,
}

impl PostRow {
    fn into_post(self, tags: Vec<String>) -> Result<Post> {
        let status: PublicationStatus = self.status.parse().map_err(|e| corrupt("post status", e))?;
        Ok(Post {
            id: self.id,
            title: self.title,
            slug: self.slug,
            description: self.description,
            text: self.text,
            thumbnail: self.thumbnail,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            author_id: self.author_id,
            updater_id: self.updater_id,
            fixed: self.fixed,
            category_id: self.category_id,
            tags,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PostViewRow {
    #[sqlx(flatten)]
    post: PostRow,
    author_username: String,
    category_title: String,
    category_slug: String,
}

impl PostViewRow {
    fn into_view(self, tags: Vec<String>) -> Result<PostView> {
        let post = self.post.into_post(tags)?;
        Ok(PostView {
            author: AuthorSummary {
                id: post.author_id,
                username: self.author_username,
            },
            category: CategorySummary {
                id: post.category_id,
                title: self.category_title,
                slug: self.category_slug,
            },
            post,
        })
    }
}

pub struct SqlitePostRepository {
    pool: SqlitePool,
}

impl SqlitePostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, condition: &str, value: impl Into<Key>) -> Result<Option<Post>> {
        let sql = format!("SELECT {COLUMNS} FROM posts p WHERE {condition}");
        let query = sqlx::query_as::<_, PostRow>(&sql);
        let query = match value.into() {
            Key::Id(id) => query.bind(id),
            Key::Slug(slug) => query.bind(slug),
        };
        let Some(row) = query.fetch_optional(&self.pool).await.map_err(storage_err)? else {
            return Ok(None);
        };
        let id = row.id;
        let tags = tags_for(&self.pool, &[id]).await?.remove(&id).unwrap_or_default();
        row.into_post(tags).map(Some)
    }
}

enum Key {
    Id(Uuid),
    Slug(String),
}

impl From<Uuid> for Key {
    fn from(id: Uuid) -> Self {
        Key::Id(id)
    }
}

impl From<&str> for Key {
    fn from(slug: &str) -> Self {
        Key::Slug(slug.to_string())
    }
}

/// Labels per post, in the order they were attached.
async fn tags_for<'e>(
    exec: impl SqliteExecutor<'e>,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<String>>> {
    let mut tags: HashMap<Uuid, Vec<String>> = HashMap::new();
    if ids.is_empty() {
        return Ok(tags);
    }
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT post_id, label FROM post_tags WHERE post_id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY rowid");
    let rows: Vec<(Uuid, String)> = qb
        .build_query_as()
        .fetch_all(exec)
        .await
        .map_err(storage_err)?;
    for (post_id, label) in rows {
        tags.entry(post_id).or_default().push(label);
    }
    Ok(tags)
}

async fn replace_tags(conn: &mut SqliteConnection, post_id: Uuid, tags: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await
        .map_err(storage_err)?;
    for label in tags {
        sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, label) VALUES (?, ?)")
            .bind(post_id)
            .bind(label)
            .execute(&mut *conn)
            .await
            .map_err(storage_err)?;
    }
    Ok(())
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn insert(&self, post: Post) -> Result<Post> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query(
            "INSERT INTO posts (id, title, slug, description, text, thumbnail, status, created_at, \
             updated_at, author_id, updater_id, fixed, category_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.description)
        .bind(&post.text)
        .bind(&post.thumbnail)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .bind(post.updated_at)
        .bind(post.author_id)
        .bind(post.updater_id)
        .bind(post.fixed)
        .bind(post.category_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;
        replace_tags(&mut tx, post.id, &post.tags).await?;

        tx.commit().await.map_err(storage_err)?;
        Ok(post)
    }

    async fn update(&self, post: Post) -> Result<Post> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let updated = sqlx::query(
            "UPDATE posts SET title = ?, slug = ?, description = ?, text = ?, thumbnail = ?, \
             status = ?, updated_at = ?, updater_id = ?, fixed = ?, category_id = ? WHERE id = ?",
        )
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.description)
        .bind(&post.text)
        .bind(&post.thumbnail)
        .bind(post.status.as_str())
        .bind(post.updated_at)
        .bind(post.updater_id)
        .bind(post.fixed)
        .bind(post.category_id)
        .bind(post.id)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?
        .rows_affected();
        if updated == 0 {
            return Err(DomainError::not_found("post", post.id));
        }
        replace_tags(&mut tx, post.id, &post.tags).await?;

        tx.commit().await.map_err(storage_err)?;
        Ok(post)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        replace_tags(&mut tx, id, &[]).await?;
        if delete_row(&mut tx, "posts", id).await? == 0 {
            return Err(DomainError::not_found("post", id));
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Post>> {
        self.fetch_where("p.id = ?", id).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        self.fetch_where("p.slug = ?", slug).await
    }

    async fn view_by_slug(&self, slug: &str) -> Result<Option<PostView>> {
        let sql = format!("SELECT {COLUMNS}, {VIEW_JOIN} WHERE p.slug = ?");
        let row = sqlx::query_as::<_, PostViewRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        match row {
            Some(row) => {
                let id = row.post.id;
                let tags = tags_for(&self.pool, &[id]).await?.remove(&id).unwrap_or_default();
                row.into_view(tags).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn list_published(&self, filter: PostFilter) -> Result<Vec<PostView>> {
        // A category filter matches the category and everything below it.
        let sql = format!(
            "SELECT {COLUMNS}, {VIEW_JOIN} \
             WHERE p.status = 'published' \
               AND (?1 IS NULL OR EXISTS ( \
                    SELECT 1 FROM categories f \
                    WHERE f.id = ?1 AND c.tree_id = f.tree_id AND c.lft BETWEEN f.lft AND f.rght)) \
               AND (?2 IS NULL OR EXISTS ( \
                    SELECT 1 FROM post_tags t WHERE t.post_id = p.id AND t.label = ?2)) \
             ORDER BY p.fixed DESC, p.created_at DESC \
             LIMIT ?3 OFFSET ?4"
        );
        let rows = sqlx::query_as::<_, PostViewRow>(&sql)
            .bind(filter.category_id)
            .bind(filter.tag)
            // SQLite reads a negative limit as "no limit".
            .bind(if filter.limit == 0 { -1 } else { i64::from(filter.limit) })
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.post.id).collect();
        let mut tags = tags_for(&self.pool, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let labels = tags.remove(&row.post.id).unwrap_or_default();
                row.into_view(labels)
            })
            .collect()
    }

    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts WHERE slug = ?1 AND (?2 IS NULL OR id != ?2)",
        )
        .bind(slug)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count > 0)
    }
}
