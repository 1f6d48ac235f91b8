//! Account Profile Store: registration, login, account and profile edits.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domains::validation::{self, BIO_MAX, NAME_MAX};
use domains::{
    AccountUpdate, CaptchaVerifier, Constraint, DomainError, MediaKind, MediaStorage, NewUser,
    PasswordHasher, Profile, ProfileUpdate, Registration, Result, User, UserRepository,
    SYSTEM_USER_ID,
};
use tracing::{info, warn};
use uuid::Uuid;

pub struct AccountService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    captcha: Arc<dyn CaptchaVerifier>,
    media: Arc<dyn MediaStorage>,
    captcha_timeout: Duration,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        captcha: Arc<dyn CaptchaVerifier>,
        media: Arc<dyn MediaStorage>,
        captcha_timeout: Duration,
    ) -> Self {
        Self {
            users,
            hasher,
            captcha,
            media,
            captcha_timeout,
        }
    }

    /// Creates the identity and its empty profile.
    pub async fn register(&self, form: Registration) -> Result<User> {
        let username = form.username.trim();
        validation::username(username)?;
        validation::password(&form.password, &form.password_confirmation)?;
        let email = form.email.trim();
        validation::email(email)?;
        validate_names(&form.first_name, &form.last_name)?;

        if self.users.username_in_use(username, None).await? {
            return Err(username_taken());
        }
        if self
            .users
            .email_in_use(&validation::normalize_email(email), None)
            .await?
        {
            return Err(email_taken());
        }

        let user = NewUser {
            id: Uuid::now_v7(),
            username: username.to_string(),
            email: email.to_string(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            password_hash: self.hasher.hash(&form.password)?,
            created_at: Utc::now(),
        };
        let user = self.users.insert(user).await.map_err(uniqueness_as_validation)?;
        info!(user_id = %user.id, username = %user.username, "account registered");
        Ok(user)
    }

    /// Checks the CAPTCHA response first and the credentials second. Any
    /// verifier failure, including a timeout, counts as a failed challenge.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        challenge_response: &str,
        remote_ip: Option<IpAddr>,
    ) -> Result<User> {
        let verdict = tokio::time::timeout(
            self.captcha_timeout,
            self.captcha.verify(challenge_response, remote_ip),
        )
        .await;
        match verdict {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                warn!(%username, "captcha rejected");
                return Err(DomainError::Challenge("verification failed".into()));
            }
            Ok(Err(e)) => {
                warn!(%username, error = %e, "captcha verifier unavailable");
                return Err(DomainError::Challenge("verifier unavailable".into()));
            }
            Err(_) => {
                warn!(%username, timeout_ms = self.captcha_timeout.as_millis() as u64, "captcha verification timed out");
                return Err(DomainError::Challenge("verification timed out".into()));
            }
        }

        let user = match self.users.find_by_username(username).await? {
            Some(user) if self.hasher.verify(password, &user.password_hash) => user,
            _ => {
                warn!(%username, "bad credentials");
                return Err(DomainError::Auth);
            }
        };
        info!(user_id = %user.id, "user authenticated");
        Ok(user)
    }

    pub async fn update_account(&self, user_id: Uuid, update: AccountUpdate) -> Result<User> {
        self.get(user_id).await?;
        let update = AccountUpdate {
            username: update.username.trim().to_string(),
            email: update.email.trim().to_string(),
            first_name: update.first_name.trim().to_string(),
            last_name: update.last_name.trim().to_string(),
        };
        validation::username(&update.username)?;
        validation::email(&update.email)?;
        validate_names(&update.first_name, &update.last_name)?;

        if self
            .users
            .username_in_use(&update.username, Some(user_id))
            .await?
        {
            return Err(username_taken());
        }
        if self
            .users
            .email_in_use(&validation::normalize_email(&update.email), Some(user_id))
            .await?
        {
            return Err(email_taken());
        }

        let user = self
            .users
            .update_account(user_id, update)
            .await
            .map_err(uniqueness_as_validation)?;
        info!(%user_id, "account updated");
        Ok(user)
    }

    /// Replaces birth date and bio. The avatar is only replaced when a new
    /// image is uploaded.
    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Profile> {
        validation::max_chars("bio", &update.bio, BIO_MAX)?;
        let current = self.profile(user_id).await?;

        let avatar = match update.avatar {
            Some(upload) => Some(self.media.store(MediaKind::Avatar, upload, Utc::now()).await?),
            None => current.avatar,
        };
        let profile = self
            .users
            .save_profile(Profile {
                user_id,
                birth_date: update.birth_date,
                bio: update.bio,
                avatar,
            })
            .await?;
        info!(%user_id, "profile updated");
        Ok(profile)
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<Profile> {
        self.users
            .profile(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("profile", user_id))
    }

    pub async fn get(&self, user_id: Uuid) -> Result<User> {
        self.users
            .get(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", user_id))
    }

    /// Deletes the account. Authored posts move to the system user, edited
    /// posts lose their updater, and comments, votes and the profile go away.
    pub async fn delete_account(&self, user_id: Uuid) -> Result<()> {
        if user_id == SYSTEM_USER_ID {
            return Err(DomainError::Referential(
                "the system user owns orphaned posts and cannot be deleted".into(),
            ));
        }
        self.get(user_id).await?;
        self.users.delete(user_id).await?;
        info!(%user_id, "account deleted");
        Ok(())
    }
}

fn validate_names(first_name: &str, last_name: &str) -> Result<()> {
    validation::max_chars("first_name", first_name, NAME_MAX)?;
    validation::max_chars("last_name", last_name, NAME_MAX)
}

fn username_taken() -> DomainError {
    DomainError::validation("username", "a user with that username already exists")
}

fn email_taken() -> DomainError {
    DomainError::validation("email", "this email is already in use")
}

/// A unique index can still fire after the lookups above when two sign-ups
/// race; report it the same way.
fn uniqueness_as_validation(err: DomainError) -> DomainError {
    match err {
        DomainError::Conflict(Constraint::UserEmail) => email_taken(),
        DomainError::Conflict(Constraint::Username) => username_taken(),
        other => other,
    }
}
