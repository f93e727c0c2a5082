//! Authentication core shared by the API and web transports.
//!
//! - **Tokens**: `TokenCodec` issues and verifies HS256 access/refresh pairs
//!   bound to one deployment domain.
//! - **Credentials**: `CredentialStore` abstracts user lookup and password
//!   checks; `UserStore` implements it over SurrealDB and bcrypt.
//! - **Guards**: `require_bearer` (API) and `require_session` (web) run
//!   before protected handlers.
//! - **Identity**: every request carries a `RequestIdentity` that handlers
//!   read as an extractor.
//!
//! ## Usage
//!
//! ```ignore
//! let codec = Arc::new(TokenCodec::new(&AuthConfig::new("example.com", secret)));
//! let user = authenticate(store.as_ref(), email, password).await?;
//! let pair = codec.issue(&user)?;
//! ```

mod context;
mod error;
mod middleware;
mod store;
mod token;
mod user_store;

pub use context::{
    RequestIdentity, SESSION_USER_KEY, attach_remote_addr, attach_session_identity, remote_addr,
};
pub use error::{AuthError, ErrorBody, StoreError, json_error};
pub use middleware::{LOGIN_PATH, require_bearer, require_session};
pub use store::{CredentialStore, User, authenticate};
pub use token::{Claims, TokenCodec, TokenKind, TokenPair, extract_bearer};
pub use user_store::{NewUser, UpdateOutcome, UserStore};
