//! HTTP transport abstraction.
//!
//! The [`Transport`] trait decouples the authentication flow, clock
//! synchronizer, and acquisition pipeline from the concrete HTTP client.
//! Each worker owns its own transport (and therefore its own cookie jar);
//! transports are never shared across workers.

pub mod cookies;
pub mod http;

use std::future::Future;
use std::pin::Pin;

pub use cookies::{CookieJar, SessionCookie};
pub use http::HttpTransport;

use crate::{AppError, Result};

/// HTTP method used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST` with a form-encoded body.
    Post,
}

/// Outbound request description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Target url without the query pairs below.
    pub url: String,
    /// Query string pairs, in order.
    pub query: Vec<(String, String)>,
    /// Form body pairs, in order (only sent for `POST`).
    pub form: Vec<(String, String)>,
    /// Extra headers on top of the transport defaults.
    pub headers: Vec<(String, String)>,
    /// Whether 3xx responses are followed.
    pub follow_redirects: bool,
}

impl HttpRequest {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Vec::new(),
            follow_redirects: true,
        }
    }

    /// Build a `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Build a `POST` request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Append a query pair.
    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_owned(), value.to_string()));
        self
    }

    /// Append form pairs.
    #[must_use]
    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.form.extend(pairs);
        self
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    /// Return 3xx responses as-is instead of following them.
    #[must_use]
    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// First query value recorded under `key`.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        lookup(&self.query, key)
    }

    /// First form value recorded under `key`.
    #[must_use]
    pub fn form_value(&self, key: &str) -> Option<&str> {
        lookup(&self.form, key)
    }

    /// First header value recorded under `name` (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

/// Response status and raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Construct a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8 (lossily).
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Reject non-2xx responses.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Network` naming `what` and the status.
    pub fn ensure_success(self, what: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AppError::Network(format!(
                "{what} returned status {}",
                self.status
            )))
        }
    }
}

/// Client-side view of a cookie-aware HTTP session.
pub trait Transport: Send + Sync {
    /// Send `request` and collect the full response.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Network`] on connection failure or timeout.
    /// Non-2xx statuses are returned as responses, not errors.
    fn execute(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>>;

    /// Current value of the cookie called `name`, if any.
    fn cookie(&self, name: &str) -> Option<String>;

    /// Snapshot of all cookies for persistence.
    fn cookies(&self) -> Vec<SessionCookie>;

    /// Seed the cookie jar with previously persisted cookies.
    fn restore(&self, cookies: &[SessionCookie]);
}
