use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use domains::validation::normalize_email;
use domains::{
    AccountUpdate, DomainError, NewUser, Profile, Result, User, UserRepository, SYSTEM_USER_ID,
};
use sqlx::sqlite::SqlitePool;
use sqlx::SqliteExecutor;
use tracing::info;
use uuid::Uuid;

use super::deletion::delete_row;
use super::storage_err;

const COLUMNS: &str = "id, username, email, first_name, last_name, password_hash, created_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    birth_date: Option<NaiveDate>,
    bio: String,
    avatar: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            user_id: row.user_id,
            birth_date: row.birth_date,
            bio: row.bio,
            avatar: row.avatar,
        }
    }
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn fetch<'e>(exec: impl SqliteExecutor<'e>, id: Uuid) -> Result<Option<User>> {
    let sql = format!("SELECT {COLUMNS} FROM users WHERE id = ?");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(storage_err)?;
    Ok(row.map(User::from))
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn insert(&self, user: NewUser) -> Result<User> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        // 1. Identity
        sqlx::query(
            "INSERT INTO users (id, username, email, email_normalized, first_name, last_name, \
             password_hash, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(normalize_email(&user.email))
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        // 2. Empty profile
        sqlx::query("INSERT INTO profiles (user_id) VALUES (?)")
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(User {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            created_at: user.created_at,
        })
    }

    async fn update_account(&self, id: Uuid, update: AccountUpdate) -> Result<User> {
        let updated = sqlx::query(
            "UPDATE users SET username = ?, email = ?, email_normalized = ?, first_name = ?, \
             last_name = ? WHERE id = ?",
        )
        .bind(&update.username)
        .bind(&update.email)
        .bind(normalize_email(&update.email))
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?
        .rows_affected();
        if updated == 0 {
            return Err(DomainError::not_found("user", id));
        }
        fetch(&self.pool, id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", id))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        if id == SYSTEM_USER_ID {
            return Err(DomainError::Referential(
                "the system user cannot be deleted".into(),
            ));
        }
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        if delete_row(&mut tx, "users", id).await? == 0 {
            return Err(DomainError::not_found("user", id));
        }
        tx.commit().await.map_err(storage_err)?;
        info!(user_id = %id, "user deleted with dependent rows");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        fetch(&self.pool, id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE username = ?");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(User::from))
    }

    async fn email_in_use(&self, email: &str, exclude: Option<Uuid>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE email_normalized = ?1 AND (?2 IS NULL OR id != ?2)",
        )
        .bind(normalize_email(email))
        .bind(exclude)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count > 0)
    }

    async fn username_in_use(&self, username: &str, exclude: Option<Uuid>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE username = ?1 AND (?2 IS NULL OR id != ?2)",
        )
        .bind(username)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count > 0)
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT user_id, birth_date, bio, avatar FROM profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.map(Profile::from))
    }

    async fn save_profile(&self, profile: Profile) -> Result<Profile> {
        sqlx::query(
            "INSERT INTO profiles (user_id, birth_date, bio, avatar) VALUES (?, ?, ?, ?) \
             ON CONFLICT (user_id) DO UPDATE SET birth_date = excluded.birth_date, \
             bio = excluded.bio, avatar = excluded.avatar",
        )
        .bind(profile.user_id)
        .bind(profile.birth_date)
        .bind(&profile.bio)
        .bind(&profile.avatar)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(profile)
    }
}
