//! Per-request session handle.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::types::SessionId;

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    /// Current identifier; `None` until something is stored
    pub(crate) id: Option<SessionId>,
    pub(crate) values: HashMap<String, Value>,
    /// Identifiers whose records must be removed at commit
    pub(crate) stale: Vec<SessionId>,
    pub(crate) modified: bool,
    /// A record for `id` existed when the request arrived
    pub(crate) loaded: bool,
    /// The browser presented a cookie that must now be cleared
    pub(crate) clear_cookie: bool,
}

/// Handle to the current request's session.
///
/// Cloning shares the same state. Changes are persisted by the session
/// layer after the handler returns.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub(crate) fn from_state(state: SessionState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn shared_state(&self) -> Arc<Mutex<SessionState>> {
        self.state.clone()
    }

    /// Read and deserialize a value. A value of the wrong shape reads as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.state.lock().await;
        let value = state.values.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "session value has unexpected shape");
                None
            }
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.values.contains_key(key)
    }

    /// Store a value, creating the session if needed.
    pub async fn insert<T: Serialize>(&self, key: &str, value: &T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        let mut state = self.state.lock().await;
        if state.id.is_none() {
            state.id = Some(SessionId::generate());
        }
        state.values.insert(key.to_string(), value);
        state.modified = true;
        Ok(())
    }

    pub async fn remove(&self, key: &str) {
        let mut state = self.state.lock().await;
        if state.values.remove(key).is_some() {
            state.modified = true;
        }
    }

    /// Issue a new identifier for the same data; the old one stops working.
    pub async fn renew_id(&self) {
        let mut state = self.state.lock().await;
        if let Some(old) = state.id.take() {
            state.stale.push(old);
        }
        state.id = Some(SessionId::generate());
        state.modified = true;
    }

    /// Drop all data and the identifier. Safe to call more than once.
    pub async fn destroy(&self) {
        let mut state = self.state.lock().await;
        state.values.clear();
        if let Some(old) = state.id.take() {
            state.stale.push(old);
            state.clear_cookie = true;
        }
        state.modified = true;
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            error!("session requested on a route without the session layer");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        })
    }
}
