//! Request-scoped identity.

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::store::User;
use crate::auth::token::Claims;
use crate::session::Session;
use crate::types::RemoteAddr;

/// Session key under which the web transport keeps the signed-in user.
pub const SESSION_USER_KEY: &str = "user";

/// Who is making the current request.
///
/// Computed per request by middleware and read by handlers through the
/// extractor impl below. Never cached across requests.
#[derive(Debug, Clone)]
pub enum RequestIdentity {
    /// Verified bearer token claims (API transport)
    Token(Claims),
    /// Signed-in session user (web transport)
    Session(User),
    /// No credential; best-effort caller address
    Anonymous(RemoteAddr),
}

impl RequestIdentity {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Anonymous(_))
    }

    /// Authenticated user id, if any.
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::Token(claims) => claims.user_id(),
            Self::Session(user) => Some(user.id),
            Self::Anonymous(_) => None,
        }
    }

    /// Short label for log fields.
    pub fn subject(&self) -> String {
        match self {
            Self::Token(claims) => format!("token:{}", claims.sub),
            Self::Session(user) => format!("session:{}", user.id),
            Self::Anonymous(addr) => format!("anonymous:{}", addr),
        }
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject())
    }
}

/// Caller address: first `X-Forwarded-For` entry, then the peer address,
/// then `"unknown"`.
pub fn remote_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> RemoteAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(addr) = forwarded {
        return RemoteAddr::new(addr);
    }

    peer.map(|addr| RemoteAddr::new(addr.ip().to_string()))
        .unwrap_or_else(RemoteAddr::unknown)
}

fn peer_addr(req: &Request) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Annotate the request with an anonymous identity. Later middleware may
/// replace it with an authenticated one.
pub async fn attach_remote_addr(mut req: Request, next: Next) -> Response {
    let addr = remote_addr(req.headers(), peer_addr(&req));
    req.extensions_mut().insert(addr.clone());
    req.extensions_mut().insert(RequestIdentity::Anonymous(addr));
    next.run(req).await
}

/// Annotate a web request with its session user, or anonymous. Must run
/// inside the session layer.
pub async fn attach_session_identity(session: Session, mut req: Request, next: Next) -> Response {
    let identity = match session.get::<User>(SESSION_USER_KEY).await {
        Some(user) => RequestIdentity::Session(user),
        None => RequestIdentity::Anonymous(remote_addr(req.headers(), peer_addr(&req))),
    };
    req.extensions_mut().insert(identity);
    next.run(req).await
}

impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<RequestIdentity>() {
            return Ok(identity.clone());
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::Anonymous(remote_addr(&parts.headers, peer)))
    }
}
