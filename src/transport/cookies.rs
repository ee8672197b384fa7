//! Serializable cookie jar plugged into `reqwest`.
//!
//! `reqwest`'s built-in jar cannot be enumerated, so session persistence
//! would lose cookies. [`CookieJar`] implements [`CookieStore`] over a plain
//! list of [`SessionCookie`] values that can be snapshotted and restored.

use std::sync::Mutex;

use chrono::Utc;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One persisted cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie applies to, without a leading dot.
    pub domain: String,
    /// Path prefix the cookie applies to.
    pub path: String,
    /// Set without a `Domain` attribute; only sent back to `domain` itself.
    #[serde(default)]
    pub host_only: bool,
}

impl SessionCookie {
    /// Construct a cookie scoped to `domain` and the root path.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: &str) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(domain),
            path: "/".into(),
            host_only: false,
        }
    }

    /// Whether the cookie should be sent to `url`.
    #[must_use]
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_match = host == self.domain
            || (!self.host_only
                && host
                    .strip_suffix(self.domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')));
        domain_match && url.path().starts_with(self.path.as_str())
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim_start_matches('.').to_ascii_lowercase()
}

/// Thread-safe cookie jar that can be persisted.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<Vec<SessionCookie>>,
}

impl CookieJar {
    /// Create a jar pre-filled with `cookies`.
    #[must_use]
    pub fn from_cookies(cookies: Vec<SessionCookie>) -> Self {
        Self {
            cookies: Mutex::new(cookies),
        }
    }

    /// Copy of every cookie in the jar.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionCookie> {
        self.cookies
            .lock()
            .map(|cookies| cookies.clone())
            .unwrap_or_default()
    }

    /// Value of the most recently stored cookie called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.lock().ok()?;
        cookies
            .iter()
            .rev()
            .find(|cookie| cookie.name == name)
            .map(|cookie| cookie.value.clone())
    }

    /// Insert or replace a cookie with the same name, domain, and path.
    pub fn insert(&self, cookie: SessionCookie) {
        if let Ok(mut cookies) = self.cookies.lock() {
            cookies.retain(|existing| !existing.same_slot(&cookie));
            cookies.push(cookie);
        }
    }

    /// Remove every cookie matching the slot of `cookie`.
    fn remove(&self, cookie: &SessionCookie) {
        if let Ok(mut cookies) = self.cookies.lock() {
            cookies.retain(|existing| !existing.same_slot(cookie));
        }
    }

    /// Apply one `Set-Cookie` header received from `url`.
    pub fn store_header(&self, raw: &str, url: &Url) {
        let Ok(parsed) = cookie::Cookie::parse(raw) else {
            debug!(header = raw, "ignoring unparsable set-cookie header");
            return;
        };
        let host_only = parsed.domain().is_none();
        let domain = parsed
            .domain()
            .map(normalize_domain)
            .or_else(|| url.host_str().map(normalize_domain))
            .unwrap_or_default();
        let stored = SessionCookie {
            name: parsed.name().to_owned(),
            value: parsed.value().to_owned(),
            domain,
            path: parsed.path().unwrap_or("/").to_owned(),
            host_only,
        };
        // Max-Age wins over Expires when both are present.
        let expired = match parsed.max_age() {
            Some(age) => age.is_zero() || age.is_negative(),
            None => parsed
                .expires_datetime()
                .is_some_and(|at| at.unix_timestamp() <= Utc::now().timestamp()),
        };
        if expired {
            self.remove(&stored);
        } else {
            self.insert(stored);
        }
    }

    /// `Cookie` header value for a request to `url`.
    #[must_use]
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies.lock().ok()?;
        let pairs: Vec<String> = cookies
            .iter()
            .filter(|cookie| cookie.matches(url))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            if let Ok(raw) = header.to_str() {
                self.store_header(raw, url);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_for(url)
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}
