//! Browser sessions: explicit request context and the session cookie.
//!
//! Handlers build a [`RequestContext`] from the incoming request, use cases
//! mutate it, and the handler turns its [`ResponseDraft`] back into headers.

mod memory;

use std::collections::HashMap;

pub use memory::InMemorySessionStore;

use crate::infrastructure::ports::SessionData;

pub const SESSION_COOKIE: &str = "RPHUDSESSID";

/// Cookie and header state of a response that has not been sent yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseDraft {
    set_cookies: Vec<String>,
    committed: bool,
}

/// Raised when a draft is modified after its headers were committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response headers already committed")]
pub struct ResponseCommitted;

impl ResponseDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Marks headers as sent. Later cookie changes fail.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    pub fn add_cookie(&mut self, cookie: String) -> Result<(), ResponseCommitted> {
        if self.committed {
            return Err(ResponseCommitted);
        }
        self.set_cookies.push(cookie);
        Ok(())
    }

    pub fn cookies(&self) -> &[String] {
        &self.set_cookies
    }
}

/// Per-request state passed explicitly to use cases.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub query: HashMap<String, String>,
    /// Session id presented by the browser, if any.
    pub session_id: Option<String>,
    pub https: bool,
    /// Session data loaded for `session_id`.
    pub session: SessionData,
    pub response: ResponseDraft,
}

impl RequestContext {
    pub fn new(query: HashMap<String, String>, session_id: Option<String>, https: bool) -> Self {
        Self {
            query,
            session_id,
            https,
            session: SessionData::new(),
            response: ResponseDraft::new(),
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

/// `Set-Cookie` value for a live session.
pub fn session_cookie(id: &str, https: bool, max_age_secs: i64) -> String {
    format_cookie(id, https, max_age_secs)
}

/// `Set-Cookie` value that removes the session cookie.
pub fn expired_session_cookie(https: bool) -> String {
    format_cookie("", https, 0)
}

fn format_cookie(value: &str, https: bool, max_age_secs: i64) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={value}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax");
    if https {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Extracts the session id from a `Cookie` header value.
pub fn session_id_from_cookie_header(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE)
        .map(|(_, value)| rphud_domain::common::sanitize_token(value))
        .filter(|value| !value.is_empty())
}
