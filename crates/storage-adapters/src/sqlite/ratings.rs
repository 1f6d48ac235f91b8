use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{Rating, RatingRepository, RatingValue, Result};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use super::{corrupt, storage_err};

#[derive(sqlx::FromRow)]
struct RatingRow {
    id: Uuid,
    post_id: Uuid,
    user_id: Option<Uuid>,
    value: i64,
    created_at: DateTime<Utc>,
    ip_address: String,
}

impl TryFrom<RatingRow> for Rating {
    type Error = domains::DomainError;

    fn try_from(row: RatingRow) -> Result<Self> {
        Ok(Rating {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            value: RatingValue::try_from(row.value).map_err(|e| corrupt("rating value", e))?,
            created_at: row.created_at,
            ip_address: row
                .ip_address
                .parse()
                .map_err(|e| corrupt("rating address", e))?,
        })
    }
}

pub struct SqliteRatingRepository {
    pool: SqlitePool,
}

impl SqliteRatingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RatingRepository for SqliteRatingRepository {
    /// A single INSERT; the `(post_id, ip_address)` unique index turns a
    /// second vote into `Conflict(RatingAddress)`.
    async fn insert(&self, rating: Rating) -> Result<Rating> {
        sqlx::query(
            "INSERT INTO ratings (id, post_id, user_id, value, created_at, ip_address) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(rating.id)
        .bind(rating.post_id)
        .bind(rating.user_id)
        .bind(rating.value.as_i64())
        .bind(rating.created_at)
        .bind(rating.ip_address.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rating)
    }

    async fn score_of(&self, post_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COALESCE(SUM(value), 0) FROM ratings WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)
    }

    async fn find(&self, post_id: Uuid, address: IpAddr) -> Result<Option<Rating>> {
        sqlx::query_as::<_, RatingRow>(
            "SELECT id, post_id, user_id, value, created_at, ip_address \
             FROM ratings WHERE post_id = ? AND ip_address = ?",
        )
        .bind(post_id)
        .bind(address.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?
        .map(Rating::try_from)
        .transpose()
    }
}
