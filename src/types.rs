//! NewType wrappers for strong typing across the auth core.
//!
//! These types keep semantically different strings apart (e.g. passing a raw
//! session cookie where its storage digest is expected).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// Opaque session identifier carried in the browser cookie.
    ///
    /// Possession of this value is what authenticates a browser session, so
    /// it is never logged and never used directly as a storage key; see
    /// `SessionDigest`.
    SessionId
);

newtype_string!(
    /// SHA-256 digest of a `SessionId`, used as the session store key.
    ///
    /// A dump of the store therefore does not contain live cookie values.
    SessionDigest
);

newtype_string!(
    /// Best-effort network address of the caller (e.g. "192.0.2.1").
    ///
    /// Taken from `X-Forwarded-For` when present, otherwise from the
    /// connection. Used for logging of anonymous requests only.
    RemoteAddr
);

impl SessionId {
    /// Generate a fresh, unguessable session identifier.
    pub fn generate() -> Self {
        Self(format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()))
    }

    /// Digest used to key this session in a store.
    pub fn digest(&self) -> SessionDigest {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        SessionDigest::new(format!("{:x}", hasher.finalize()))
    }
}

impl RemoteAddr {
    /// Placeholder used when no address can be determined.
    pub fn unknown() -> Self {
        Self::new("unknown")
    }
}
