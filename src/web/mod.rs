// Browser transport: server-rendered pages behind cookie sessions

pub mod forms;
mod pages;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Form as FormBody, Multipart, State,
        multipart::MultipartRejection,
        rejection::FormRejection,
    },
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{
    CredentialStore, LOGIN_PATH, RequestIdentity, SESSION_USER_KEY, UserStore,
    attach_session_identity, authenticate, require_session,
};
use crate::config::WebConfig;
use crate::session::{Session, SessionManager, load_session};
use forms::Form;

/// Where a successful login lands.
pub const PROFILE_PATH: &str = "/user/profile";

/// Multipart target for profile pictures.
pub const UPLOAD_PATH: &str = "/user/upload-profile-pic";

/// Multipart field carrying the picture.
const UPLOAD_FIELD: &str = "file";

const LOGIN_FAILED: &str = "Invalid login credentials";
const HOME_SESSION_KEY: &str = "test";

/// Shared state for web handlers.
#[derive(Clone)]
pub struct WebState {
    pub credentials: Arc<dyn CredentialStore>,
    pub users: Arc<UserStore>,
    pub config: Arc<WebConfig>,
}

impl WebState {
    /// State whose credential checks go through the same `UserStore`.
    pub fn new(users: Arc<UserStore>, config: WebConfig) -> Self {
        Self {
            credentials: users.clone(),
            users,
            config: Arc::new(config),
        }
    }
}

pub fn create_web_router(state: WebState, sessions: SessionManager) -> Router {
    let protected = Router::new()
        .route(PROFILE_PATH, get(profile))
        .route(
            UPLOAD_PATH,
            post(upload_profile_pic).layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .route_layer(from_fn(require_session));

    Router::new()
        .route("/", get(home))
        .route(LOGIN_PATH, get(login_form).post(login))
        .route("/logout", post(logout))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(sessions, load_session))
                .layer(from_fn(attach_session_identity)),
        )
        .with_state(state)
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
}

async fn home(session: Session) -> Response {
    if let Some(value) = session.get::<String>(HOME_SESSION_KEY).await {
        return Html(pages::home(&value)).into_response();
    }

    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = session.insert(HOME_SESSION_KEY, &now).await {
        error!(error = %e, "failed to store home page value");
        return internal_error();
    }
    Html(pages::home(&now)).into_response()
}

async fn login_form() -> Html<String> {
    Html(pages::login(None, ""))
}

/// `POST /login`. Every client-side failure re-renders the form with one
/// generic message.
async fn login(
    State(state): State<WebState>,
    session: Session,
    identity: RequestIdentity,
    submitted: Result<FormBody<HashMap<String, String>>, FormRejection>,
) -> Response {
    let data = submitted.map(|FormBody(data)| data).unwrap_or_default();
    let mut form = Form::new(data);
    form.required(&["email", "password"]);

    let failed = |form: &Form| Html(pages::login(Some(LOGIN_FAILED), form.get("email"))).into_response();

    if !form.valid() {
        warn!(from = %identity, "login form incomplete");
        return failed(&form);
    }

    let user = match authenticate(
        state.credentials.as_ref(),
        form.get("email"),
        form.get("password"),
    )
    .await
    {
        Ok(user) => user,
        Err(e) if e.is_server_fault() => {
            error!(error = %e, from = %identity, "login backend failure");
            return internal_error();
        }
        Err(e) => {
            warn!(kind = e.kind(), from = %identity, "web login rejected");
            return failed(&form);
        }
    };

    session.renew_id().await;
    if let Err(e) = session.insert(SESSION_USER_KEY, &user).await {
        error!(error = %e, "failed to store session user");
        return internal_error();
    }

    info!(user_id = user.id, "web login");
    Redirect::to(PROFILE_PATH).into_response()
}

async fn logout(session: Session, identity: RequestIdentity) -> Redirect {
    session.destroy().await;
    info!(who = %identity, "logged out");
    Redirect::to(LOGIN_PATH)
}

async fn profile(State(state): State<WebState>, identity: RequestIdentity) -> Response {
    let RequestIdentity::Session(user) = identity else {
        return Redirect::temporary(LOGIN_PATH).into_response();
    };

    match state.users.profile_image(user.id).await {
        Ok(image) => Html(pages::profile(&user, image.as_deref())).into_response(),
        Err(e) => {
            error!(error = %e, user_id = user.id, "failed to load profile picture");
            internal_error()
        }
    }
}

/// Stored name for an upload: a fresh id plus the original extension, if
/// it is plain alphanumeric.
fn stored_file_name(original: Option<&str>) -> String {
    let extension = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());

    match extension {
        Some(ext) => format!("{}.{}", Uuid::new_v4().simple(), ext),
        None => Uuid::new_v4().simple().to_string(),
    }
}

/// `POST /user/upload-profile-pic`: store the `file` part and record it
/// as the signed-in user's picture.
async fn upload_profile_pic(
    State(state): State<WebState>,
    identity: RequestIdentity,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let RequestIdentity::Session(user) = identity else {
        return Redirect::temporary(LOGIN_PATH).into_response();
    };
    let Ok(mut multipart) = multipart else {
        return (StatusCode::BAD_REQUEST, "expected a multipart form").into_response();
    };

    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(user_id = user.id, error = %e, "unreadable upload");
                return (e.status(), "invalid upload").into_response();
            }
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = stored_file_name(field.file_name());
        match field.bytes().await {
            Ok(data) if !data.is_empty() => upload = Some((file_name, data)),
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = user.id, error = %e, "unreadable upload");
                return (e.status(), "invalid upload").into_response();
            }
        }
    }

    let Some((file_name, data)) = upload else {
        return (StatusCode::BAD_REQUEST, "no file uploaded").into_response();
    };

    let upload_dir = &state.config.upload_dir;
    if let Err(e) = tokio::fs::create_dir_all(upload_dir).await {
        error!(error = %e, dir = %upload_dir.display(), "cannot create upload directory");
        return internal_error();
    }
    if let Err(e) = tokio::fs::write(upload_dir.join(&file_name), &data).await {
        error!(error = %e, "failed to write uploaded file");
        return internal_error();
    }

    match state.users.insert_user_image(user.id, &file_name).await {
        Ok(image_id) => {
            info!(user_id = user.id, image_id, size_bytes = data.len(), "profile picture uploaded");
            Redirect::to(PROFILE_PATH).into_response()
        }
        Err(e) => {
            error!(error = %e, user_id = user.id, "failed to record profile picture");
            internal_error()
        }
    }
}
