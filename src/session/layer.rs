//! Loads the session before the handler and persists it afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, error};

use crate::auth::{SESSION_USER_KEY, StoreError};
use crate::config::SessionConfig;
use crate::session::cookie::{CookieSpec, read_cookie};
use crate::session::handle::{Session, SessionState};
use crate::session::store::{SessionRecord, SessionStore};
use crate::types::SessionId;

/// Shared session machinery for one router.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Idle timeout for a session holding `values`. Sessions without a
    /// signed-in user expire sooner.
    fn idle_timeout_seconds(&self, values: &HashMap<String, Value>) -> u64 {
        if values.contains_key(SESSION_USER_KEY) {
            self.config.idle_timeout_seconds
        } else {
            self.config.anonymous_idle_timeout_seconds
        }
    }

    /// Build the handle for a request carrying `cookie`.
    async fn open(&self, cookie: Option<String>) -> Result<Session, StoreError> {
        let Some(raw) = cookie else {
            return Ok(Session::default());
        };

        let id = SessionId::new(raw);
        match self.store.load(&id.digest()).await? {
            Some(record) => Ok(Session::from_state(SessionState {
                id: Some(id),
                values: record.values,
                loaded: true,
                ..Default::default()
            })),
            None => {
                debug!("unknown or expired session cookie");
                Ok(Session::from_state(SessionState {
                    clear_cookie: true,
                    ..Default::default()
                }))
            }
        }
    }

    /// Persist the session and return the `Set-Cookie` value to send, if any.
    async fn commit(&self, session: &Session) -> Result<Option<String>, StoreError> {
        let state = session.shared_state();
        let state = state.lock().await;

        for stale in &state.stale {
            self.store.delete(&stale.digest()).await?;
        }

        let cookie = CookieSpec::new(&self.config.cookie_name, "")
            .secure(self.config.secure_cookie);

        match &state.id {
            // Non-empty sessions are re-saved on every request for sliding expiry.
            Some(id) if !state.values.is_empty() => {
                let idle = self.idle_timeout_seconds(&state.values);
                let record = SessionRecord {
                    values: state.values.clone(),
                    expires_at: Utc::now() + Duration::seconds(idle as i64),
                };
                self.store.save(&id.digest(), &record).await?;

                let value = CookieSpec {
                    value: id.as_str(),
                    ..cookie
                }
                .max_age(idle)
                .build();
                Ok(Some(value))
            }
            Some(id) => {
                if state.loaded {
                    self.store.delete(&id.digest()).await?;
                    return Ok(Some(cookie.removal()));
                }
                Ok(None)
            }
            None if state.clear_cookie => Ok(Some(cookie.removal())),
            None => Ok(None),
        }
    }
}

/// Session middleware for `axum::middleware::from_fn_with_state`.
///
/// Inserts a `Session` into request extensions and commits it with one
/// store write (or delete) once the handler has produced a response.
pub async fn load_session(
    State(manager): State<SessionManager>,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie = read_cookie(req.headers(), &manager.config.cookie_name);

    let session = match manager.open(cookie).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "failed to load session");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    };

    req.extensions_mut().insert(session.clone());
    let mut response = next.run(req).await;

    match manager.commit(&session).await {
        Ok(Some(cookie)) => match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!(error = %e, "session cookie is not a valid header value"),
        },
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "failed to save session");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use axum::Router;
    use axum::body::Body;
    use axum::http::header::COOKIE;
    use axum::routing::{get, post};
    use tower::ServiceExt;

    fn app(store: Arc<MemorySessionStore>) -> Router {
        let manager = SessionManager::new(store, SessionConfig::default());

        Router::new()
            .route(
                "/set",
                post(|session: Session| async move {
                    session.insert("user", &"alice").await.unwrap();
                    "ok"
                }),
            )
            .route(
                "/visit",
                post(|session: Session| async move {
                    session.insert("visited", &true).await.unwrap();
                    "ok"
                }),
            )
            .route(
                "/get",
                get(|session: Session| async move {
                    session.get::<String>("user").await.unwrap_or_default()
                }),
            )
            .route(
                "/renew",
                post(|session: Session| async move {
                    session.renew_id().await;
                    "ok"
                }),
            )
            .route(
                "/destroy",
                post(|session: Session| async move {
                    session.destroy().await;
                    session.destroy().await;
                    "ok"
                }),
            )
            .layer(axum::middleware::from_fn_with_state(manager, load_session))
    }

    fn session_cookie(response: &Response) -> Option<String> {
        response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    }

    fn cookie_pair(set_cookie: &str) -> String {
        set_cookie.split(';').next().unwrap_or_default().to_string()
    }

    async fn body_text(response: Response) -> String {
        use http_body_util::BodyExt;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn call(app: &Router, method: &str, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        app.clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_untouched_session_sets_no_cookie() {
        let store = Arc::new(MemorySessionStore::new());
        let app = app(store.clone());

        let response = call(&app, "GET", "/get", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_cookie(&response).is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_session_round_trip_through_cookie() {
        let store = Arc::new(MemorySessionStore::new());
        let app = app(store.clone());

        let response = call(&app, "POST", "/set", None).await;
        let set_cookie = session_cookie(&response).unwrap();
        assert!(set_cookie.starts_with("session="));
        assert!(set_cookie.contains("HttpOnly"));
        assert_eq!(store.len().await, 1);

        let cookie = cookie_pair(&set_cookie);
        let response = call(&app, "GET", "/get", Some(&cookie)).await;
        assert_eq!(body_text(response).await, "alice");
    }

    async fn stored_expiry(store: &MemorySessionStore, set_cookie: &str) -> chrono::DateTime<Utc> {
        let pair = cookie_pair(set_cookie);
        let (_, raw) = pair.split_once('=').unwrap();
        store
            .load(&SessionId::new(raw).digest())
            .await
            .unwrap()
            .unwrap()
            .expires_at
    }

    #[tokio::test]
    async fn test_anonymous_session_expires_sooner() {
        let store = Arc::new(MemorySessionStore::new());
        let app = app(store.clone());
        let config = SessionConfig::default();

        let response = call(&app, "POST", "/visit", None).await;
        let anonymous = session_cookie(&response).unwrap();
        assert!(anonymous.contains(&format!(
            "Max-Age={}",
            config.anonymous_idle_timeout_seconds
        )));
        let anonymous_expiry = stored_expiry(&store, &anonymous).await;
        assert!(
            anonymous_expiry
                <= Utc::now() + Duration::seconds(config.anonymous_idle_timeout_seconds as i64)
        );

        let response = call(&app, "POST", "/set", None).await;
        let signed_in = session_cookie(&response).unwrap();
        assert!(signed_in.contains(&format!("Max-Age={}", config.idle_timeout_seconds)));
        let signed_in_expiry = stored_expiry(&store, &signed_in).await;
        assert!(
            signed_in_expiry
                > Utc::now() + Duration::seconds(config.anonymous_idle_timeout_seconds as i64)
        );
    }

    #[tokio::test]
    async fn test_renew_invalidates_old_cookie() {
        let store = Arc::new(MemorySessionStore::new());
        let app = app(store.clone());

        let response = call(&app, "POST", "/set", None).await;
        let old = cookie_pair(&session_cookie(&response).unwrap());

        let response = call(&app, "POST", "/renew", Some(&old)).await;
        let new = cookie_pair(&session_cookie(&response).unwrap());
        assert_ne!(old, new);
        assert_eq!(store.len().await, 1);

        let response = call(&app, "GET", "/get", Some(&old)).await;
        assert_eq!(body_text(response).await, "");

        let response = call(&app, "GET", "/get", Some(&new)).await;
        assert_eq!(body_text(response).await, "alice");
    }

    #[tokio::test]
    async fn test_destroy_removes_record_and_cookie() {
        let store = Arc::new(MemorySessionStore::new());
        let app = app(store.clone());

        let response = call(&app, "POST", "/set", None).await;
        let cookie = cookie_pair(&session_cookie(&response).unwrap());

        let response = call(&app, "POST", "/destroy", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_cookie(&response).unwrap().contains("Max-Age=0"));
        assert!(store.is_empty().await);

        // The dead cookie is cleared again and destroying stays harmless
        let response = call(&app, "POST", "/destroy", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_cookie(&response).unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_route_without_layer_is_server_error() {
        let app = Router::new().route(
            "/",
            get(|session: Session| async move {
                session.contains("user").await.to_string()
            }),
        );

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
