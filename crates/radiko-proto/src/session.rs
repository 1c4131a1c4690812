//! Cookie continuity across every radiko request.
//!
//! One `SessionStore` is shared by all client components. It keeps the
//! latest cookie set and replaces it wholesale whenever a response carries
//! cookies; a response without cookies leaves the stored set alone.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use reqwest::header::COOKIE;
use reqwest::{RequestBuilder, Response};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    cookies: Arc<RwLock<BTreeMap<String, String>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge stored cookies into the request being built. No-op when empty.
    pub fn attach_to(&self, request: RequestBuilder) -> RequestBuilder {
        match self.cookie_header() {
            Some(value) => request.header(COOKIE, value),
            None => request,
        }
    }

    /// Replace the stored cookies with the response's, if it set any.
    pub fn absorb(&self, response: &Response) {
        let fresh: BTreeMap<String, String> = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        self.replace(fresh);
    }

    pub fn replace(&self, fresh: BTreeMap<String, String>) {
        if fresh.is_empty() {
            return;
        }
        debug!("session: storing {} cookie(s)", fresh.len());
        if let Ok(mut guard) = self.cookies.write() {
            *guard = fresh;
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.cookies.write() {
            guard.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.read().map(|g| g.is_empty()).unwrap_or(true)
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.cookies.read().map(|g| g.clone()).unwrap_or_default()
    }

    /// `name=value; name=value`, or `None` when nothing is stored.
    pub fn cookie_header(&self) -> Option<String> {
        let guard = self.cookies.read().ok()?;
        if guard.is_empty() {
            return None;
        }
        Some(
            guard
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
