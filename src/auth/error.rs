//! Authentication error taxonomy.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Authentication errors.
///
/// Each kind is structurally distinct so callers can pick a transport
/// outcome (hard 401, "please refresh", redirect, 5xx) with a `match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header, no session entry, or an empty login field
    MissingCredential,
    /// Wrong header shape, unparsable token, or wrong token kind
    MalformedCredential,
    /// Bad signature or a disallowed signing algorithm
    InvalidSignatureOrAlgorithm,
    /// Token was not issued for this deployment's domain
    WrongIssuer,
    /// Token `exp` is in the past
    Expired,
    /// No user with the given email or id
    UserNotFound,
    /// Password did not match the stored hash
    PasswordMismatch,
    /// Credential or session store could not be reached
    StoreUnavailable(String),
    /// The signing primitive failed
    Signing(String),
}

impl AuthError {
    /// Short, stable name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MalformedCredential => "malformed_credential",
            Self::InvalidSignatureOrAlgorithm => "invalid_signature_or_algorithm",
            Self::WrongIssuer => "wrong_issuer",
            Self::Expired => "expired",
            Self::UserNotFound => "user_not_found",
            Self::PasswordMismatch => "password_mismatch",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Signing(_) => "signing",
        }
    }

    /// Infrastructure failures. These are never reported as "unauthenticated".
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Signing(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "No credential provided"),
            Self::MalformedCredential => write!(f, "Malformed credential"),
            Self::InvalidSignatureOrAlgorithm => {
                write!(f, "Invalid token signature or algorithm")
            }
            Self::WrongIssuer => write!(f, "Token issuer does not match this deployment"),
            Self::Expired => write!(f, "Token has expired"),
            Self::UserNotFound => write!(f, "User not found"),
            Self::PasswordMismatch => write!(f, "Password does not match"),
            Self::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            Self::Signing(msg) => write!(f, "Token signing failed: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Errors surfaced by credential and session stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record does not exist
    NotFound,
    /// Transport or backend failure
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Record not found"),
            Self::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::UserNotFound,
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
        }
    }
}

/// JSON error body used by the API transport.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: bool,
    pub message: String,
}

/// Build a JSON error response.
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: true,
            message: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        assert_eq!(AuthError::Expired.to_string(), "Token has expired");
        assert_eq!(
            AuthError::StoreUnavailable("db down".to_string()).to_string(),
            "Store unavailable: db down"
        );
        assert_eq!(
            AuthError::MissingCredential.to_string(),
            "No credential provided"
        );
    }

    #[test]
    fn test_server_faults() {
        assert!(AuthError::StoreUnavailable("x".to_string()).is_server_fault());
        assert!(AuthError::Signing("x".to_string()).is_server_fault());
        assert!(!AuthError::Expired.is_server_fault());
        assert!(!AuthError::UserNotFound.is_server_fault());
        assert!(!AuthError::PasswordMismatch.is_server_fault());
    }

    #[test]
    fn test_store_error_conversion() {
        assert_eq!(AuthError::from(StoreError::NotFound), AuthError::UserNotFound);
        assert_eq!(
            AuthError::from(StoreError::Unavailable("timeout".to_string())),
            AuthError::StoreUnavailable("timeout".to_string())
        );
    }

    #[test]
    fn test_json_error_status() {
        let response = json_error(StatusCode::UNAUTHORIZED, "unauthorized");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
