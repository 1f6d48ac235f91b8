//! # SQLite store
//!
//! Implements every repository port on one `SqlitePool`.
//!
//! # Developer Note
//! Multi-statement writes run in a transaction and every statement inside
//! it must go through that transaction's connection. The in-memory store has
//! exactly one connection, so touching the pool while a transaction is open
//! would wait forever.

mod categories;
mod comments;
mod deletion;
mod nested_set;
mod posts;
mod ratings;
mod users;

use std::str::FromStr;
use std::time::Duration;

use domains::{Constraint, DomainError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub use categories::SqliteCategoryRepository;
pub use comments::SqliteCommentRepository;
pub use posts::SqlitePostRepository;
pub use ratings::SqliteRatingRepository;
pub use users::SqliteUserRepository;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url`, e.g.
    /// `sqlite://data/inkwell.db`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage_err)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(storage_err)?;
        info!(%url, max_connections, "connected to sqlite");
        Ok(Self { pool })
    }

    /// A fresh, migrated database that lives as long as the store.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(storage_err)?
            .foreign_keys(true);
        // Every connection would get its own empty database: keep exactly
        // one, forever.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::Storage(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn categories(&self) -> SqliteCategoryRepository {
        SqliteCategoryRepository::new(self.pool.clone())
    }

    pub fn posts(&self) -> SqlitePostRepository {
        SqlitePostRepository::new(self.pool.clone())
    }

    pub fn comments(&self) -> SqliteCommentRepository {
        SqliteCommentRepository::new(self.pool.clone())
    }

    pub fn ratings(&self) -> SqliteRatingRepository {
        SqliteRatingRepository::new(self.pool.clone())
    }

    pub fn users(&self) -> SqliteUserRepository {
        SqliteUserRepository::new(self.pool.clone())
    }
}

/// Maps driver errors onto the domain taxonomy. Unique violations become
/// `Conflict` on the constraint named in SQLite's message, e.g.
/// `UNIQUE constraint failed: ratings.post_id, ratings.ip_address`.
pub(crate) fn storage_err(err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            if let Some(constraint) = constraint_from_message(db.message()) {
                return DomainError::Conflict(constraint);
            }
        }
        if db.is_foreign_key_violation() {
            return DomainError::Referential(db.message().to_string());
        }
    }
    DomainError::Storage(err.to_string())
}

fn constraint_from_message(message: &str) -> Option<Constraint> {
    let columns = message.split_once("failed:")?.1;
    let constraint = if columns.contains("posts.slug") {
        Constraint::PostSlug
    } else if columns.contains("categories.slug") {
        Constraint::CategorySlug
    } else if columns.contains("users.email_normalized") {
        Constraint::UserEmail
    } else if columns.contains("users.username") {
        Constraint::Username
    } else if columns.contains("ratings.post_id") {
        Constraint::RatingAddress
    } else {
        return None;
    };
    Some(constraint)
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::Storage(format!("corrupt {what} in database: {err}"))
}
