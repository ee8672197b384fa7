//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Connection failure, timeout, or non-success HTTP status.
    Network(String),
    /// Response body could not be parsed or had an unexpected shape.
    Parse(String),
    /// Well-formed response explicitly reporting a business failure.
    Rejected {
        /// Numeric result code reported by the remote service.
        code: i64,
        /// Human-readable message reported by the remote service.
        message: String,
    },
    /// Login code expired before the operator confirmed it.
    AuthExpired(String),
    /// Login ticket was rejected or the login code could not be issued.
    AuthFailed(String),
    /// Authoritative time source was unreachable or malformed.
    ClockSync(String),
    /// Persisted session could not be read or written.
    Session(String),
}

impl AppError {
    /// Whether the acquisition pipeline recovers from this error by retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Parse(_) | Self::Rejected { .. }
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Network(msg) => write!(f, "network: {msg}"),
            Self::Parse(msg) => write!(f, "parse: {msg}"),
            Self::Rejected { code, message } => write!(f, "rejected: [{code}] {message}"),
            Self::AuthExpired(msg) => write!(f, "auth expired: {msg}"),
            Self::AuthFailed(msg) => write!(f, "auth failed: {msg}"),
            Self::ClockSync(msg) => write!(f, "clock sync: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
