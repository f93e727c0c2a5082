//! Runtime configuration for the auth core and both transports.
//!
//! Every value is passed explicitly into the component that needs it; there
//! is no process-wide configuration state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::{env, fmt};

/// Access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 15 * 60;

/// Refresh token lifetime (24 hours).
pub const DEFAULT_REFRESH_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Session idle timeout (24 hours).
pub const DEFAULT_SESSION_IDLE_SECONDS: u64 = 24 * 60 * 60;

/// Idle timeout for sessions with no signed-in user (30 minutes).
pub const DEFAULT_ANONYMOUS_IDLE_SECONDS: u64 = 30 * 60;

/// Largest accepted profile picture upload (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Development-only signing secret, used when none is configured.
const DEV_JWT_SECRET: &str = "dev-only-secret-change-me-before-deploying";

/// Token signing configuration.
///
/// `domain` is both the issuer and the audience of every token. It and
/// `jwt_secret` must be identical on every instance of a deployment.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Issuer and audience of issued tokens
    pub domain: String,
    /// Shared HMAC secret
    pub jwt_secret: String,
    /// Access token lifetime in seconds (default: 900)
    #[serde(default = "default_access_ttl_seconds")]
    pub access_ttl_seconds: u64,
    /// Refresh token lifetime in seconds (default: 86400)
    #[serde(default = "default_refresh_ttl_seconds")]
    pub refresh_ttl_seconds: u64,
}

fn default_access_ttl_seconds() -> u64 {
    DEFAULT_ACCESS_TTL_SECONDS
}

fn default_refresh_ttl_seconds() -> u64 {
    DEFAULT_REFRESH_TTL_SECONDS
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            domain: env::var("WEBAPP_DOMAIN").unwrap_or_else(|_| "example.com".to_string()),
            jwt_secret: env::var("WEBAPP_JWT_SECRET")
                .unwrap_or_else(|_| DEV_JWT_SECRET.to_string()),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
        }
    }
}

impl AuthConfig {
    /// Create a config with the default token lifetimes.
    pub fn new(domain: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            jwt_secret: jwt_secret.into(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
        }
    }

    /// Whether the built-in development secret is in use.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("domain", &self.domain)
            .field("jwt_secret", &"<redacted>")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .finish()
    }
}

/// Browser session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the session cookie
    pub cookie_name: String,
    /// Signed-in sessions untouched for this long are discarded
    #[serde(default = "default_session_idle_seconds")]
    pub idle_timeout_seconds: u64,
    /// Idle timeout for sessions that hold no signed-in user
    #[serde(default = "default_anonymous_idle_seconds")]
    pub anonymous_idle_timeout_seconds: u64,
    /// Mark the cookie `Secure` (HTTPS only)
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_session_idle_seconds() -> u64 {
    DEFAULT_SESSION_IDLE_SECONDS
}

fn default_anonymous_idle_seconds() -> u64 {
    DEFAULT_ANONYMOUS_IDLE_SECONDS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_string(),
            idle_timeout_seconds: DEFAULT_SESSION_IDLE_SECONDS,
            anonymous_idle_timeout_seconds: DEFAULT_ANONYMOUS_IDLE_SECONDS,
            secure_cookie: false,
        }
    }
}

/// API transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Origin allowed to make credentialed cross-origin requests
    pub allowed_origin: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            allowed_origin: env::var("WEBAPP_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
        }
    }
}

/// Browser transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Directory profile pictures are written to
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            upload_dir: env::var("WEBAPP_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./static/img")),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}
