//! Protected user management endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::{Extension, extract::rejection::JsonRejection};
use serde::Deserialize;
use tracing::{error, info};

use crate::api::ApiState;
use crate::auth::{Claims, NewUser, UpdateOutcome, User, json_error};
use crate::db::schema::UserUpdate;

/// Body of `PUT /users`.
#[derive(Debug, Deserialize)]
pub struct InsertUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Body of `PATCH /users`.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

const EMAIL_TAKEN: &str = "email already in use";

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %err, "user repository failure");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

fn require_admin(claims: &Claims) -> Result<(), Response> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(json_error(StatusCode::FORBIDDEN, "forbidden"))
    }
}

pub async fn all_users(State(state): State<ApiState>) -> Response {
    match state.users.all_users().await {
        Ok(users) => Json(users).into_response(),
        Err(e) => server_error(e),
    }
}

pub async fn get_user(State(state): State<ApiState>, Path(id): Path<i64>) -> Response {
    match state.users.get_user(id).await {
        Ok(Some(user)) => Json::<User>(user).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => server_error(e),
    }
}

pub async fn insert_user(
    State(state): State<ApiState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<InsertUserRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&claims) {
        return response;
    }
    let Ok(Json(req)) = payload else {
        return json_error(StatusCode::BAD_REQUEST, "invalid request body");
    };
    if req.email.is_empty() || req.password.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "email and password are required");
    }

    let new_user = NewUser {
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
        password: req.password,
        is_admin: req.is_admin,
    };

    match state.users.create_user(new_user).await {
        Ok(Some(id)) => {
            info!(user_id = id, by = %claims.sub, "user created");
            (StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response()
        }
        Ok(None) => json_error(StatusCode::CONFLICT, EMAIL_TAKEN),
        Err(e) => server_error(e),
    }
}

pub async fn update_user(
    State(state): State<ApiState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&claims) {
        return response;
    }
    let Ok(Json(req)) = payload else {
        return json_error(StatusCode::BAD_REQUEST, "invalid request body");
    };

    let update = UserUpdate {
        uid: req.id,
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
        is_admin: req.is_admin,
    };

    match state.users.update_user(&update).await {
        Ok(UpdateOutcome::Updated) => {
            info!(user_id = update.uid, by = %claims.sub, "user updated");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(UpdateOutcome::NotFound) => json_error(StatusCode::NOT_FOUND, "user not found"),
        Ok(UpdateOutcome::EmailTaken) => json_error(StatusCode::CONFLICT, EMAIL_TAKEN),
        Err(e) => server_error(e),
    }
}

pub async fn delete_user(
    State(state): State<ApiState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(response) = require_admin(&claims) {
        return response;
    }

    match state.users.delete_user(id).await {
        Ok(()) => {
            info!(user_id = id, by = %claims.sub, "user deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => server_error(e),
    }
}
