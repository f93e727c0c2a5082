//! Signed credential pairs: issuance, verification and bearer extraction.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::auth::error::AuthError;
use crate::auth::store::User;
use crate::config::AuthConfig;

/// The only accepted signing algorithm.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims carried by both token kinds.
///
/// Access tokens additionally carry `name` and `admin`; refresh tokens carry
/// only the registered claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a decimal string
    pub sub: String,
    pub iss: String,
    pub aud: String,
    /// Expiry, unix seconds
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl Claims {
    /// Numeric user id from `sub`.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    pub fn is_admin(&self) -> bool {
        self.admin.unwrap_or(false)
    }

    pub fn kind(&self) -> TokenKind {
        if self.name.is_some() || self.admin.is_some() {
            TokenKind::Access
        } else {
            TokenKind::Refresh
        }
    }
}

/// An access/refresh token pair as returned to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies HS256 tokens for one deployment domain.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct TokenCodec {
    domain: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl_seconds: u64,
    refresh_ttl_seconds: u64,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();

        let mut validation = Validation::new(ALGORITHM);
        // Issuer and audience are compared against the domain after decoding
        // so a mismatch maps to its own error kind.
        validation.validate_aud = false;
        // A token is expired the second its `exp` has passed.
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Self {
            domain: config.domain.clone(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_ttl_seconds: config.access_ttl_seconds,
            refresh_ttl_seconds: config.refresh_ttl_seconds,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn refresh_ttl_seconds(&self) -> u64 {
        self.refresh_ttl_seconds
    }

    /// Issue a fresh access/refresh pair for `user`.
    pub fn issue(&self, user: &User) -> Result<TokenPair, AuthError> {
        let now = get_current_timestamp();

        let access = Claims {
            sub: user.id.to_string(),
            iss: self.domain.clone(),
            aud: self.domain.clone(),
            exp: now + self.access_ttl_seconds,
            name: Some(user.full_name()),
            admin: Some(user.is_admin),
        };

        let refresh = Claims {
            sub: user.id.to_string(),
            iss: self.domain.clone(),
            aud: self.domain.clone(),
            exp: now + self.refresh_ttl_seconds,
            name: None,
            admin: None,
        };

        let pair = TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        };

        debug!(user_id = user.id, "issued token pair");
        Ok(pair)
    }

    /// Sign arbitrary claims with this codec's key.
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "token signing failed");
            AuthError::Signing(e.to_string())
        })
    }

    /// Verify a token of either kind and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedCredential)?;
        if header.alg != ALGORITHM {
            return Err(AuthError::InvalidSignatureOrAlgorithm);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignatureOrAlgorithm
                }
                _ => AuthError::MalformedCredential,
            }
        })?;

        let claims = data.claims;
        if claims.iss != self.domain || claims.aud != self.domain {
            return Err(AuthError::WrongIssuer);
        }

        Ok(claims)
    }

    /// Verify a token and require it to be an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.verify(token)?;
        match claims.kind() {
            TokenKind::Access => Ok(claims),
            TokenKind::Refresh => Err(AuthError::MalformedCredential),
        }
    }

    /// Verify a token and require it to be a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.verify(token)?;
        match claims.kind() {
            TokenKind::Refresh => Ok(claims),
            TokenKind::Access => Err(AuthError::MalformedCredential),
        }
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
///
/// The header must hold exactly two space-separated fields, the first being
/// literally `Bearer`.
pub fn extract_bearer(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = match headers.get(AUTHORIZATION) {
        Some(value) => value.to_str().map_err(|_| AuthError::MalformedCredential)?,
        None => return Err(AuthError::MissingCredential),
    };

    if value.is_empty() {
        return Err(AuthError::MissingCredential);
    }

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] if !token.is_empty() => Ok((*token).to_string()),
        _ => Err(AuthError::MalformedCredential),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::tests::admin_user;
    use axum::http::HeaderValue;

    fn codec() -> TokenCodec {
        TokenCodec::new(&AuthConfig::new("example.com", "verysecret"))
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_issue_and_verify_access() {
        let codec = codec();
        let user = admin_user();

        let pair = codec.issue(&user).unwrap();
        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());

        let claims = codec.verify(&pair.access_token).unwrap();
        assert_eq!(claims.user_id(), Some(user.id));
        assert_eq!(claims.iss, "example.com");
        assert_eq!(claims.aud, "example.com");
        assert_eq!(claims.name.as_deref(), Some("Admin User"));
        assert!(claims.is_admin());
        assert_eq!(claims.kind(), TokenKind::Access);

        let expected = get_current_timestamp() + 15 * 60;
        assert!(claims.exp.abs_diff(expected) <= 5);
    }

    #[test]
    fn test_refresh_claims_are_minimal() {
        let codec = codec();
        let pair = codec.issue(&admin_user()).unwrap();

        let claims = codec.verify(&pair.refresh_token).unwrap();
        assert_eq!(claims.sub, "1");
        assert!(claims.name.is_none());
        assert!(claims.admin.is_none());
        assert_eq!(claims.kind(), TokenKind::Refresh);

        let expected = get_current_timestamp() + 24 * 60 * 60;
        assert!(claims.exp.abs_diff(expected) <= 5);
    }

    #[test]
    fn test_non_admin_claim() {
        let mut user = admin_user();
        user.is_admin = false;
        let codec = codec();

        let pair = codec.issue(&user).unwrap();
        let claims = codec.verify(&pair.access_token).unwrap();
        assert_eq!(claims.admin, Some(false));
    }

    #[test]
    fn test_verify_is_idempotent() {
        let codec = codec();
        let pair = codec.issue(&admin_user()).unwrap();

        let first = codec.verify(&pair.access_token).unwrap();
        let second = codec.verify(&pair.access_token).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_secret_rejected() {
        let other = TokenCodec::new(&AuthConfig::new("example.com", "another-secret"));
        let pair = other.issue(&admin_user()).unwrap();

        assert_eq!(
            codec().verify(&pair.access_token).unwrap_err(),
            AuthError::InvalidSignatureOrAlgorithm
        );
    }

    #[test]
    fn test_expired_token() {
        let codec = codec();
        let claims = Claims {
            sub: "1".to_string(),
            iss: "example.com".to_string(),
            aud: "example.com".to_string(),
            exp: get_current_timestamp() - 3600,
            name: Some("Admin User".to_string()),
            admin: Some(true),
        };
        let token = codec.sign(&claims).unwrap();

        assert_eq!(codec.verify(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn test_just_expired_token() {
        let codec = codec();
        let claims = Claims {
            sub: "1".to_string(),
            iss: "example.com".to_string(),
            aud: "example.com".to_string(),
            exp: get_current_timestamp() - 1,
            name: Some("Admin User".to_string()),
            admin: Some(true),
        };
        let token = codec.sign(&claims).unwrap();

        assert_eq!(codec.verify(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn test_wrong_issuer() {
        let foreign = TokenCodec::new(&AuthConfig::new("other.example.org", "verysecret"));
        let pair = foreign.issue(&admin_user()).unwrap();

        assert_eq!(
            codec().verify(&pair.access_token).unwrap_err(),
            AuthError::WrongIssuer
        );
    }

    #[test]
    fn test_wrong_audience() {
        let codec = codec();
        let claims = Claims {
            sub: "1".to_string(),
            iss: "example.com".to_string(),
            aud: "elsewhere.example.org".to_string(),
            exp: get_current_timestamp() + 60,
            name: None,
            admin: None,
        };
        let token = codec.sign(&claims).unwrap();

        assert_eq!(codec.verify(&token).unwrap_err(), AuthError::WrongIssuer);
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let claims = Claims {
            sub: "1".to_string(),
            iss: "example.com".to_string(),
            aud: "example.com".to_string(),
            exp: get_current_timestamp() + 60,
            name: Some("Admin User".to_string()),
            admin: Some(true),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"verysecret"),
        )
        .unwrap();

        assert_eq!(
            codec().verify(&token).unwrap_err(),
            AuthError::InvalidSignatureOrAlgorithm
        );
    }

    #[test]
    fn test_garbage_token() {
        assert_eq!(
            codec().verify("not.a.token").unwrap_err(),
            AuthError::MalformedCredential
        );
        assert_eq!(
            codec().verify("").unwrap_err(),
            AuthError::MalformedCredential
        );
    }

    #[test]
    fn test_unsigned_token_rejected() {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            format!(
                r#"{{"sub":"1","iss":"example.com","aud":"example.com","exp":{},"name":"Admin User","admin":true}}"#,
                get_current_timestamp() + 60
            )
            .as_bytes(),
        );
        let token = format!("{}.{}.", header, payload);

        assert!(codec().verify(&token).is_err());
    }

    #[test]
    fn test_token_kind_enforced() {
        let codec = codec();
        let pair = codec.issue(&admin_user()).unwrap();

        assert!(codec.verify_access(&pair.access_token).is_ok());
        assert!(codec.verify_refresh(&pair.refresh_token).is_ok());
        assert_eq!(
            codec.verify_access(&pair.refresh_token).unwrap_err(),
            AuthError::MalformedCredential
        );
        assert_eq!(
            codec.verify_refresh(&pair.access_token).unwrap_err(),
            AuthError::MalformedCredential
        );
    }

    #[test]
    fn test_token_pair_wire_format() {
        let pair = TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["access_token"], "a");
        assert_eq!(json["refresh_token"], "r");
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(
            extract_bearer(&headers_with("Bearer abc.def.ghi")).unwrap(),
            "abc.def.ghi"
        );
    }

    #[test]
    fn test_extract_bearer_missing() {
        assert_eq!(
            extract_bearer(&HeaderMap::new()).unwrap_err(),
            AuthError::MissingCredential
        );
        assert_eq!(
            extract_bearer(&headers_with("")).unwrap_err(),
            AuthError::MissingCredential
        );
    }

    #[test]
    fn test_extract_bearer_malformed() {
        for value in ["sometoken", "Bearer x y", "Bearerish x", "bearer x", "Bearer "] {
            assert_eq!(
                extract_bearer(&headers_with(value)).unwrap_err(),
                AuthError::MalformedCredential,
                "header {:?}",
                value
            );
        }
    }
}
