//! Route guards for both transports.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{VARY, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{debug, error, warn};

use crate::auth::context::{RequestIdentity, SESSION_USER_KEY};
use crate::auth::error::{AuthError, json_error};
use crate::auth::token::{TokenCodec, extract_bearer};
use crate::session::Session;

/// Where unauthenticated browsers are sent.
pub const LOGIN_PATH: &str = "/login";

fn challenge(err: &AuthError) -> HeaderValue {
    match err {
        AuthError::MissingCredential => HeaderValue::from_static("Bearer"),
        AuthError::Expired => {
            HeaderValue::from_static(r#"Bearer error="invalid_token", error_description="expired""#)
        }
        _ => HeaderValue::from_static(r#"Bearer error="invalid_token""#),
    }
}

/// Reject API requests without a valid access token.
///
/// On success the verified `Claims` and a `RequestIdentity::Token` are placed
/// in request extensions. No store I/O happens here.
pub async fn require_bearer(
    State(codec): State<Arc<TokenCodec>>,
    mut req: Request,
    next: Next,
) -> Response {
    let verified = extract_bearer(req.headers()).and_then(|token| codec.verify_access(&token));

    let mut response = match verified {
        Ok(claims) => {
            debug!(sub = %claims.sub, "bearer token accepted");
            req.extensions_mut().insert(claims.clone());
            req.extensions_mut().insert(RequestIdentity::Token(claims));
            next.run(req).await
        }
        Err(err) if err.is_server_fault() => {
            error!(error = %err, "bearer verification failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
        Err(err) => {
            warn!(kind = err.kind(), path = %req.uri().path(), "bearer token rejected");
            let mut response = json_error(StatusCode::UNAUTHORIZED, "unauthorized");
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, challenge(&err));
            response
        }
    };

    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Send browsers without a signed-in session to the login page (307).
pub async fn require_session(session: Session, req: Request, next: Next) -> Response {
    if !session.contains(SESSION_USER_KEY).await {
        debug!(path = %req.uri().path(), "no session user, redirecting to login");
        return Redirect::temporary(LOGIN_PATH).into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::tests::admin_user;
    use crate::auth::token::Claims;
    use crate::config::AuthConfig;
    use axum::Router;
    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, LOCATION};
    use axum::routing::get;
    use tower::ServiceExt;

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new(&AuthConfig::new("example.com", "verysecret")))
    }

    fn protected(codec: Arc<TokenCodec>) -> Router {
        Router::new()
            .route(
                "/me",
                get(|identity: RequestIdentity| async move { identity.subject() }),
            )
            .route_layer(axum::middleware::from_fn_with_state(codec, require_bearer))
    }

    async fn call(app: Router, authorization: Option<&str>) -> Response {
        let mut builder = axum::http::Request::builder().uri("/me");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        use http_body_util::BodyExt;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let codec = codec();
        let pair = codec.issue(&admin_user()).unwrap();

        let response = call(
            protected(codec),
            Some(&format!("Bearer {}", pair.access_token)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(VARY).unwrap(), "Authorization");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let response = call(protected(codec()), None).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(VARY).unwrap(), "Authorization");
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");

        let body = body_json(response).await;
        assert_eq!(body["error"], true);
        assert_eq!(body["message"], "unauthorized");
    }

    #[tokio::test]
    async fn test_malformed_header() {
        let response = call(protected(codec()), Some("Token abc")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_token_challenge() {
        let codec = codec();
        let token = codec
            .sign(&Claims {
                sub: "1".to_string(),
                iss: "example.com".to_string(),
                aud: "example.com".to_string(),
                exp: jsonwebtoken::get_current_timestamp() - 3600,
                name: Some("Admin User".to_string()),
                admin: Some(true),
            })
            .unwrap();

        let response = call(protected(codec), Some(&format!("Bearer {}", token))).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers().get(WWW_AUTHENTICATE).unwrap();
        assert!(challenge.to_str().unwrap().contains("expired"));
    }

    #[tokio::test]
    async fn test_refresh_token_not_accepted_as_access() {
        let codec = codec();
        let pair = codec.issue(&admin_user()).unwrap();

        let response = call(
            protected(codec),
            Some(&format!("Bearer {}", pair.refresh_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_foreign_secret_rejected() {
        let foreign = Arc::new(TokenCodec::new(&AuthConfig::new("example.com", "other")));
        let pair = foreign.issue(&admin_user()).unwrap();

        let response = call(
            protected(codec()),
            Some(&format!("Bearer {}", pair.access_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_session_redirects() {
        use crate::config::SessionConfig;
        use crate::session::{MemorySessionStore, SessionManager, load_session};

        let manager = SessionManager::new(
            Arc::new(MemorySessionStore::new()),
            SessionConfig::default(),
        );
        let app = Router::new()
            .route("/private", get(|| async { "secret" }))
            .route_layer(axum::middleware::from_fn(require_session))
            .layer(axum::middleware::from_fn_with_state(manager, load_session));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/private")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");
    }
}
