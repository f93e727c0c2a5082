//! SurrealDB-backed user storage and bcrypt password handling.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::error::StoreError;
use crate::auth::store::{CredentialStore, User};
use crate::db::schema::{UserCreate, UserImageCreate, UserUpdate};
use crate::db::{Db, DuplicateEmail, QueryBuilder};

/// Fields accepted when creating a user. The password is plaintext and is
/// hashed before it reaches the database.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub is_admin: bool,
}

/// Result of a profile update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
    /// Another user already has the requested email
    EmailTaken,
}

/// User store for database operations.
pub struct UserStore {
    db: Db,
    hash_cost: u32,
    /// Hash of a random password, checked when a login names no account
    absent_hash: OnceCell<String>,
}

impl UserStore {
    /// Create a new user store using the default bcrypt cost.
    pub fn new(db: Db) -> Self {
        Self {
            db,
            hash_cost: bcrypt::DEFAULT_COST,
            absent_hash: OnceCell::new(),
        }
    }

    /// Override the bcrypt cost. Tests use the minimum to stay fast.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Hash a plaintext password on the blocking pool.
    pub async fn hash_password(&self, plaintext: &str) -> Result<String> {
        let plaintext = plaintext.to_string();
        let cost = self.hash_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost)).await??;
        Ok(hash)
    }

    /// Create a user. Returns `None` when the email is already taken.
    pub async fn create_user(&self, new_user: NewUser) -> Result<Option<i64>> {
        if QueryBuilder::get_user_by_email(&self.db, &new_user.email)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let password_hash = self.hash_password(&new_user.password).await?;
        let created = QueryBuilder::insert_user(
            &self.db,
            &UserCreate {
                first_name: new_user.first_name,
                last_name: new_user.last_name,
                email: new_user.email,
                password_hash,
                is_admin: new_user.is_admin,
            },
        )
        .await;

        match created {
            Ok(id) => Ok(Some(id)),
            // Lost a race with a concurrent insert of the same email.
            Err(e) if e.is::<DuplicateEmail>() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn all_users(&self) -> Result<Vec<User>> {
        let records = QueryBuilder::all_users(&self.db).await?;
        Ok(records.into_iter().map(User::from).collect())
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(QueryBuilder::get_user(&self.db, id).await?.map(User::from))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(QueryBuilder::get_user_by_email(&self.db, email)
            .await?
            .map(User::from))
    }

    /// Update profile fields. The new email must not belong to another user.
    pub async fn update_user(&self, update: &UserUpdate) -> Result<UpdateOutcome> {
        if let Some(owner) = QueryBuilder::get_user_by_email(&self.db, &update.email).await? {
            if owner.uid != update.uid {
                return Ok(UpdateOutcome::EmailTaken);
            }
        }

        match QueryBuilder::update_user(&self.db, update).await {
            Ok(true) => Ok(UpdateOutcome::Updated),
            Ok(false) => Ok(UpdateOutcome::NotFound),
            Err(e) if e.is::<DuplicateEmail>() => Ok(UpdateOutcome::EmailTaken),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        QueryBuilder::delete_user(&self.db, id).await
    }

    /// Hash and store a new password.
    pub async fn reset_password(&self, id: i64, plaintext: &str) -> Result<()> {
        let hash = self.hash_password(plaintext).await?;
        QueryBuilder::reset_password(&self.db, id, &hash).await
    }

    /// Record an uploaded profile picture for an existing user.
    pub async fn insert_user_image(&self, user_id: i64, file_name: &str) -> Result<i64> {
        QueryBuilder::insert_user_image(
            &self.db,
            &UserImageCreate {
                user_id,
                file_name: file_name.to_string(),
            },
        )
        .await
    }

    /// File name of the user's current profile picture.
    pub async fn profile_image(&self, user_id: i64) -> Result<Option<String>> {
        Ok(QueryBuilder::latest_user_image(&self.db, user_id)
            .await?
            .map(|image| image.file_name))
    }
}

fn unavailable(err: anyhow::Error) -> StoreError {
    error!(error = %err, "user store query failed");
    StoreError::Unavailable(err.to_string())
}

/// bcrypt check on the blocking pool. The inner result is bcrypt's own.
async fn check_hash(
    plaintext: &str,
    hash: String,
) -> Result<bcrypt::BcryptResult<bool>, StoreError> {
    let plaintext = plaintext.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash))
        .await
        .map_err(|e| StoreError::Unavailable(format!("password check aborted: {}", e)))
}

#[async_trait]
impl CredentialStore for UserStore {
    async fn find_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.get_user(id)
            .await
            .map_err(unavailable)?
            .ok_or(StoreError::NotFound)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.get_user_by_email(email)
            .await
            .map_err(unavailable)?
            .ok_or(StoreError::NotFound)
    }

    async fn verify_password(&self, user: &User, plaintext: &str) -> Result<bool, StoreError> {
        match check_hash(plaintext, user.password_hash.clone()).await? {
            Ok(matches) => Ok(matches),
            Err(e) => {
                // A corrupt stored hash cannot match anything.
                warn!(user_id = user.id, error = %e, "stored password hash is unusable");
                Ok(false)
            }
        }
    }

    async fn verify_absent_password(&self, plaintext: &str) -> Result<(), StoreError> {
        let hash = self
            .absent_hash
            .get_or_try_init(|| async { self.hash_password(&Uuid::new_v4().to_string()).await })
            .await
            .map_err(unavailable)?;

        // The outcome is irrelevant, only the time spent matters.
        let _ = check_hash(plaintext, hash.clone()).await?;
        Ok(())
    }
}
