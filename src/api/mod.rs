// JSON API transport: token login, refresh and protected user management

mod users;

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::State,
    http::{
        HeaderMap, HeaderValue, Method, StatusCode,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, SET_COOKIE},
    },
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::{
    AuthError, CredentialStore, RequestIdentity, TokenCodec, TokenPair, UserStore,
    attach_remote_addr, authenticate, json_error, require_bearer,
};
use crate::config::ApiConfig;
use crate::session::cookie::{CookieSpec, read_cookie};
use crate::types::RemoteAddr;

pub use users::{InsertUserRequest, UpdateUserRequest};

/// Name and path of the cookie mirroring the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/refresh-token";

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub codec: Arc<TokenCodec>,
    pub credentials: Arc<dyn CredentialStore>,
    pub users: Arc<UserStore>,
}

impl ApiState {
    /// State whose credential checks go through the same `UserStore`.
    pub fn new(codec: Arc<TokenCodec>, users: Arc<UserStore>) -> Self {
        Self {
            codec,
            credentials: users.clone(),
            users,
        }
    }
}

pub fn create_api_router(state: ApiState, config: &ApiConfig) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.allowed_origin)?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let protected = Router::new()
        .route(
            "/users",
            get(users::all_users)
                .put(users::insert_user)
                .patch(users::update_user),
        )
        .route(
            "/users/{id}",
            get(users::get_user).delete(users::delete_user),
        )
        .route_layer(from_fn_with_state(state.codec.clone(), require_bearer));

    Ok(Router::new()
        .route("/health", get(health_check))
        .route("/auth", post(login))
        .route("/refresh-token", post(refresh))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(from_fn(attach_remote_addr)),
        )
        .with_state(state))
}

/// Liveness plus the caller as the API sees it.
async fn health_check(
    identity: RequestIdentity,
    Extension(client_addr): Extension<RemoteAddr>,
) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "caller": identity.subject(),
        "client_addr": client_addr,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: String,
}

/// Respond with a token pair and mirror the refresh token into a cookie.
fn token_response(codec: &TokenCodec, pair: TokenPair) -> Response {
    let cookie = CookieSpec::new(REFRESH_COOKIE_NAME, &pair.refresh_token)
        .path(REFRESH_COOKIE_PATH)
        .max_age(codec.refresh_ttl_seconds())
        .build();

    let mut response = Json(pair).into_response();
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().insert(SET_COOKIE, value);
        }
        Err(e) => error!(error = %e, "refresh cookie is not a valid header value"),
    }
    response
}

fn auth_failure(err: AuthError, identity: &RequestIdentity, message: &str) -> Response {
    if err.is_server_fault() {
        error!(error = %err, from = %identity, "authentication backend failure");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
    }
    warn!(kind = err.kind(), from = %identity, "authentication rejected");
    json_error(StatusCode::UNAUTHORIZED, message)
}

/// `POST /auth`: exchange email and password for a token pair.
///
/// Every client-side failure yields the same 401 body.
async fn login(State(state): State<ApiState>, identity: RequestIdentity, body: Bytes) -> Response {
    let req: LoginRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(_) => {
            return auth_failure(AuthError::MalformedCredential, &identity, INVALID_CREDENTIALS);
        }
    };

    let user = match authenticate(state.credentials.as_ref(), &req.email, &req.password).await {
        Ok(user) => user,
        Err(e) => return auth_failure(e, &identity, INVALID_CREDENTIALS),
    };

    match state.codec.issue(&user) {
        Ok(pair) => {
            info!(user_id = user.id, "api login");
            token_response(&state.codec, pair)
        }
        Err(e) => auth_failure(e, &identity, INVALID_CREDENTIALS),
    }
}

/// `POST /refresh-token`: trade a refresh token for a new pair.
///
/// The token is read from the JSON body, falling back to the refresh cookie.
async fn refresh(
    State(state): State<ApiState>,
    identity: RequestIdentity,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let from_body = serde_json::from_slice::<RefreshRequest>(&body)
        .map(|req| req.refresh_token)
        .unwrap_or_default();

    let token = if from_body.is_empty() {
        read_cookie(&headers, REFRESH_COOKIE_NAME).unwrap_or_default()
    } else {
        from_body
    };

    if token.is_empty() {
        return auth_failure(AuthError::MissingCredential, &identity, "unauthorized");
    }

    let claims = match state.codec.verify_refresh(&token) {
        Ok(claims) => claims,
        Err(e) => return auth_failure(e, &identity, "unauthorized"),
    };

    let Some(user_id) = claims.user_id() else {
        return auth_failure(AuthError::MalformedCredential, &identity, "unauthorized");
    };

    let user = match state.credentials.find_user_by_id(user_id).await {
        Ok(user) => user,
        Err(e) => return auth_failure(e.into(), &identity, "unauthorized"),
    };

    match state.codec.issue(&user) {
        Ok(pair) => token_response(&state.codec, pair),
        Err(e) => auth_failure(e, &identity, "unauthorized"),
    }
}
