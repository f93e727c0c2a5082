//! Minimal `Cookie` / `Set-Cookie` handling.

use http::HeaderMap;
use http::header::COOKIE;

/// Find a cookie value by name across all `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Attributes for an outgoing cookie.
#[derive(Debug, Clone)]
pub struct CookieSpec<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub path: &'a str,
    /// `None` produces a browser-session cookie
    pub max_age_seconds: Option<u64>,
    pub secure: bool,
}

impl<'a> CookieSpec<'a> {
    pub fn new(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            value,
            path: "/",
            max_age_seconds: None,
            secure: false,
        }
    }

    pub fn path(mut self, path: &'a str) -> Self {
        self.path = path;
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age_seconds = Some(seconds);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Render as a `Set-Cookie` header value. Always `HttpOnly; SameSite=Lax`.
    pub fn build(&self) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; HttpOnly; SameSite=Lax",
            self.name, self.value, self.path
        );
        if let Some(max_age) = self.max_age_seconds {
            cookie.push_str(&format!("; Max-Age={}", max_age));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that deletes this cookie.
    pub fn removal(&self) -> String {
        CookieSpec {
            value: "",
            max_age_seconds: Some(0),
            ..self.clone()
        }
        .build()
    }
}
