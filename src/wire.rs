//! Helpers for the remote service's response framing and request noise.
//!
//! Most endpoints answer with JSONP (`jQuery123({...})`) or JSON with
//! trailing junk, so bodies are decoded by slicing from the first `{` to
//! the last `}`.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::{AppError, Result};

/// Longest response excerpt written to logs and error messages.
pub const EXCERPT_CHARS: usize = 128;

/// Decode the JSON object embedded in `body`.
///
/// # Errors
///
/// Returns `AppError::Parse` if the body holds no `{...}` span or the span
/// does not deserialize into `T`.
pub fn extract_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    let (Some(begin), Some(end)) = (body.find('{'), body.rfind('}')) else {
        return Err(AppError::Parse(format!(
            "no json object in response: {}",
            excerpt(body)
        )));
    };
    if end < begin {
        return Err(AppError::Parse(format!(
            "malformed json object in response: {}",
            excerpt(body)
        )));
    }
    serde_json::from_str(&body[begin..=end])
        .map_err(|err| AppError::Parse(format!("{err}: {}", excerpt(body))))
}

/// First [`EXCERPT_CHARS`] characters of `body`.
#[must_use]
pub fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_CHARS).collect()
}

/// Random JSONP callback name in the form the web client uses.
#[must_use]
pub fn jquery_callback() -> String {
    format!("jQuery{}", rand::thread_rng().gen_range(1_000_000..=9_999_999))
}

/// Uniformly random delay in `[min_ms, max_ms]`.
#[must_use]
pub fn backoff(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Protocol-relative url (`//host/path`) made absolute over https.
#[must_use]
pub fn absolute_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_owned()
    } else {
        format!("https:{url}")
    }
}

/// JSON scalar the service sends as either a string or a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Quoted value.
    Text(String),
    /// Bare numeric value.
    Number(serde_json::Number),
    /// Boolean value.
    Flag(bool),
}

impl Scalar {
    /// Interpret the scalar as a signed integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Text(text) => text.trim().parse().ok(),
            Self::Number(number) => number.as_i64(),
            Self::Flag(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
            Self::Flag(flag) => write!(f, "{flag}"),
        }
    }
}
