//! Credential store contract consumed by the auth core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::error::{AuthError, StoreError};

/// A user account as seen by the auth core.
///
/// The password hash is never serialized, so a `User` can be written to a
/// session or returned from the API as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// "First Last", as carried in the access token `name` claim.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// User lookup and password verification, supplied by the host application.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> Result<User, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn verify_password(&self, user: &User, plaintext: &str) -> Result<bool, StoreError>;

    /// Spend the work of one `verify_password` when no account matched the
    /// submitted email. Stores without a slow hash can keep the default.
    async fn verify_absent_password(&self, _plaintext: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Resolve an email/password pair to a user.
///
/// Distinct failure kinds are returned for logging; transports collapse
/// every non-server-fault kind into one "invalid credentials" outcome.
pub async fn authenticate(
    store: &dyn CredentialStore,
    email: &str,
    password: &str,
) -> Result<User, AuthError> {
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredential);
    }

    let user = match store.find_user_by_email(email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            // Unknown and known emails cost the same password check.
            store.verify_absent_password(password).await?;
            return Err(AuthError::UserNotFound);
        }
        Err(e) => return Err(e.into()),
    };

    if !store.verify_password(&user, password).await? {
        return Err(AuthError::PasswordMismatch);
    }

    debug!(user_id = user.id, "credentials verified");
    Ok(user)
}
