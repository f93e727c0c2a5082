// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod session;
mod types;

// Transports
pub mod api;
pub mod web;

// Re-export key types and functions
pub use api::{ApiState, create_api_router};
pub use auth::{AuthError, CredentialStore, NewUser, TokenCodec, UpdateOutcome, User, UserStore};
pub use config::{ApiConfig, AuthConfig, SessionConfig, WebConfig};
pub use db::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use session::{MemorySessionStore, SessionManager};
pub use types::{RemoteAddr, SessionDigest, SessionId};
pub use web::{WebState, create_web_router};

use anyhow::Result;

/// Connect to the database described by `config` and make sure the schema
/// exists, returning a user store over it.
pub async fn open_user_store(config: DatabaseConfig) -> Result<UserStore> {
    let db = create_connection(config).await?;
    ensure_schema(&db).await?;
    Ok(UserStore::new(db))
}
