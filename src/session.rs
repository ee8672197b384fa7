//! Per-account session persistence.
//!
//! Each account's cookies live in `<dir>/<username>_cookies.json`. The
//! file's modification time is the session's age; anything older than
//! [`SESSION_TTL`] is treated as absent so the caller re-authenticates.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::transport::SessionCookie;
use crate::{AppError, Result};

/// Maximum age of a reusable session.
pub const SESSION_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// Authenticated cookie state for one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Owning account.
    pub username: String,
    /// Cookies captured after login.
    pub cookies: Vec<SessionCookie>,
    /// When the session was captured.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Capture a session for `username`.
    #[must_use]
    pub fn new(username: impl Into<String>, cookies: Vec<SessionCookie>) -> Self {
        Self {
            username: username.into(),
            cookies,
            created_at: Utc::now(),
        }
    }
}

/// File-backed session store partitioned by username.
pub struct SessionStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionStore {
    /// Store rooted at `dir`, aging sessions against `clock`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
            ttl: SESSION_TTL,
        }
    }

    /// Override the session TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Directory holding session and login-code files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Session file for `username`.
    #[must_use]
    pub fn session_path(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{username}_cookies.json"))
    }

    /// Login-code image file for `username`.
    #[must_use]
    pub fn qr_code_path(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{username}_qr_code.png"))
    }

    /// Load the stored session for `username`.
    ///
    /// Returns `Ok(None)` when no session is stored, when it is at least
    /// as old as the TTL, or when the file is corrupt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the file exists but cannot be read.
    pub fn load(&self, username: &str) -> Result<Option<Session>> {
        let path = self.session_path(username);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(username, "no stored session");
                return Ok(None);
            }
            Err(err) => {
                return Err(AppError::Session(format!(
                    "cannot stat {}: {err}",
                    path.display()
                )))
            }
        };

        let modified = metadata
            .modified()
            .map_err(|err| AppError::Session(format!("no mtime for {}: {err}", path.display())))?;
        let saved_ms = DateTime::<Utc>::from(modified).timestamp_millis();
        let age_ms = self.clock.now_ms().saturating_sub(saved_ms);
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if age_ms >= ttl_ms {
            info!(username, age_ms, "stored session expired");
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)
            .map_err(|err| AppError::Session(format!("cannot read {}: {err}", path.display())))?;
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!(username, %err, "stored session is corrupt, ignoring it");
                Ok(None)
            }
        }
    }

    /// Persist `session` under its username.
    ///
    /// The file is written beside its final path and renamed into place so
    /// readers never observe a partial session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the directory or file cannot be written.
    pub fn save(&self, session: &Session) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            AppError::Session(format!("cannot create {}: {err}", self.dir.display()))
        })?;

        let path = self.session_path(&session.username);
        let staging = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(session)
            .map_err(|err| AppError::Session(format!("cannot encode session: {err}")))?;
        fs::write(&staging, payload)
            .map_err(|err| AppError::Session(format!("cannot write {}: {err}", staging.display())))?;
        fs::rename(&staging, &path)
            .map_err(|err| AppError::Session(format!("cannot replace {}: {err}", path.display())))?;

        info!(username = session.username, cookies = session.cookies.len(), "session saved");
        Ok(())
    }
}
