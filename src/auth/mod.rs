//! Login-code authentication.
//!
//! [`QrLogin`] walks the state machine
//! `Unauthenticated → AwaitingScan → AwaitingConfirmation → Validating →
//! Authenticated | Failed`. A stored, unexpired session that passes the
//! authenticated probe short-circuits straight to `Authenticated` without
//! fetching a login code.
//!
//! Failures are fatal to the login operation: an expired code or rejected
//! ticket needs the operator to scan again, so nothing here retries.

pub mod viewer;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, info_span, warn, Instrument};

pub use viewer::{ImageViewer, SystemImageViewer};

use crate::clock::Clock;
use crate::config::{AccountConfig, Endpoints, GlobalConfig};
use crate::session::{Session, SessionStore};
use crate::transport::{HttpRequest, Transport};
use crate::wire::{excerpt, extract_json, jquery_callback, Scalar};
use crate::{AppError, Result};

/// Application id the login-code endpoints expect.
const QR_APP_ID: &str = "133";
/// Pixel size of the requested login-code image.
const QR_SIZE: &str = "147";
/// Cookie carrying the login-code token set by the image request.
const QR_TOKEN_COOKIE: &str = "wlfstk_smdl";
/// Marker present in pages that bounce an anonymous visitor to login.
const LOGIN_REDIRECT_MARKER: &str = "passport.jd.com/uc/login?ReturnUrl";
/// Referer sent by the ticket validation request.
const VALIDATE_REFERER: &str = "https://passport.jd.com/uc/login?ltype=logout";

/// Authentication lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No usable session yet.
    Unauthenticated,
    /// Login code displayed, waiting for the operator to scan it.
    AwaitingScan,
    /// Code scanned; a ticket has been issued.
    AwaitingConfirmation,
    /// Ticket submitted for validation.
    Validating,
    /// Session is usable.
    Authenticated,
    /// Login failed; the operator must start over.
    Failed,
}

impl AuthState {
    /// Determine whether a state transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Unauthenticated,
                Self::AwaitingScan | Self::Authenticated | Self::Failed
            ) | (
                Self::AwaitingScan,
                Self::AwaitingConfirmation | Self::Failed
            ) | (Self::AwaitingConfirmation, Self::Validating)
                | (Self::Validating, Self::Authenticated | Self::Failed)
        )
    }
}

/// Ticket issued once the operator confirms the login code.
///
/// Consumed by validation; never stored.
#[derive(Debug, PartialEq, Eq)]
pub struct AuthTicket(String);

impl AuthTicket {
    /// Wrap a raw ticket value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw ticket value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    code: Scalar,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    ticket: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    #[serde(rename = "returnCode")]
    return_code: Scalar,
}

/// Login-code authentication flow for one account.
pub struct QrLogin {
    username: String,
    endpoints: Endpoints,
    poll_interval: Duration,
    max_polls: u32,
    transport: Arc<dyn Transport>,
    store: Arc<SessionStore>,
    viewer: Arc<dyn ImageViewer>,
    clock: Arc<dyn Clock>,
    state: AuthState,
}

impl QrLogin {
    /// Construct a flow for `account` in the `Unauthenticated` state.
    #[must_use]
    pub fn new(
        account: &AccountConfig,
        config: &GlobalConfig,
        transport: Arc<dyn Transport>,
        store: Arc<SessionStore>,
        viewer: Arc<dyn ImageViewer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            username: account.username.clone(),
            endpoints: config.endpoints.clone(),
            poll_interval: config.login.poll_interval(),
            max_polls: config.login.max_polls,
            transport,
            store,
            viewer,
            clock,
            state: AuthState::Unauthenticated,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Bring the account to `Authenticated`, reusing a stored session when possible.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthExpired` if the code is not confirmed within
    /// the poll budget, `AppError::AuthFailed` if the code cannot be issued
    /// or the ticket is rejected, and `AppError::Network`/`Session` for
    /// transport or persistence failures. The state is `Failed` afterwards.
    pub async fn login(&mut self) -> Result<()> {
        let span = info_span!("login", username = %self.username);
        self.run_login().instrument(span).await
    }

    async fn run_login(&mut self) -> Result<()> {
        let stored = match self.store.load(&self.username) {
            Ok(stored) => stored,
            Err(err) => {
                self.transition(AuthState::Failed);
                return Err(err);
            }
        };
        if let Some(session) = stored {
            self.transport.restore(&session.cookies);
            if self.probe().await {
                self.transition(AuthState::Authenticated);
                info!("stored session still valid");
                return Ok(());
            }
            info!("stored session rejected by probe, logging in again");
        }

        self.transition(AuthState::AwaitingScan);
        match self.scan_and_validate().await {
            Ok(()) => {
                self.transition(AuthState::Authenticated);
                info!("login code accepted");
                Ok(())
            }
            Err(err) => {
                self.state = AuthState::Failed;
                Err(err)
            }
        }
    }

    /// Probe an authenticated page; `true` when the session is logged in.
    pub async fn probe(&self) -> bool {
        let request = HttpRequest::get(&self.endpoints.order_list)
            .query("rid", self.clock.now_ms())
            .without_redirects();
        match self.transport.execute(request).await {
            Ok(response) => {
                response.is_success() && !response.text().contains(LOGIN_REDIRECT_MARKER)
            }
            Err(err) => {
                warn!(%err, "session probe failed");
                false
            }
        }
    }

    async fn scan_and_validate(&mut self) -> Result<()> {
        self.fetch_login_page().await?;
        let image = self.fetch_login_code().await?;
        if let Err(err) = self.viewer.open(&image) {
            warn!(%err, path = %image.display(), "open the login code manually");
        }

        let ticket = self.await_ticket().await?;
        self.transition(AuthState::AwaitingConfirmation);

        self.transition(AuthState::Validating);
        self.validate_ticket(ticket).await?;

        let session = Session::new(self.username.clone(), self.transport.cookies());
        self.store.save(&session)
    }

    async fn fetch_login_page(&self) -> Result<()> {
        let request = HttpRequest::get(&self.endpoints.login_page);
        self.transport
            .execute(request)
            .await?
            .ensure_success("login page")?;
        Ok(())
    }

    async fn fetch_login_code(&self) -> Result<PathBuf> {
        let request = HttpRequest::get(&self.endpoints.qr_show)
            .query("appid", QR_APP_ID)
            .query("size", QR_SIZE)
            .query("t", self.clock.now_ms())
            .header("Referer", &self.endpoints.login_page);
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(AppError::AuthFailed(format!(
                "login code download returned status {}",
                response.status
            )));
        }

        let path = self.store.qr_code_path(&self.username);
        fs::create_dir_all(self.store.dir())?;
        fs::write(&path, &response.body)?;
        info!(path = %path.display(), "login code saved, scan it with the mobile app");
        Ok(path)
    }

    async fn await_ticket(&self) -> Result<AuthTicket> {
        for attempt in 1..=self.max_polls {
            match self.poll_ticket().await {
                Ok(Some(ticket)) => {
                    info!(attempt, "login confirmed on mobile");
                    return Ok(ticket);
                }
                Ok(None) => {}
                Err(err) => warn!(attempt, %err, "login code poll failed"),
            }
            self.clock.sleep(self.poll_interval).await;
        }
        Err(AppError::AuthExpired(format!(
            "login code not confirmed after {} polls, fetch a new one",
            self.max_polls
        )))
    }

    async fn poll_ticket(&self) -> Result<Option<AuthTicket>> {
        let token = self.transport.cookie(QR_TOKEN_COOKIE).unwrap_or_default();
        let request = HttpRequest::get(&self.endpoints.qr_check)
            .query("appid", QR_APP_ID)
            .query("callback", jquery_callback())
            .query("token", token)
            .query("_", self.clock.now_ms())
            .header("Referer", &self.endpoints.login_page);
        let response = self
            .transport
            .execute(request)
            .await?
            .ensure_success("login code poll")?;

        let check: CheckResponse = extract_json(&response.text())?;
        if check.code.as_i64() != Some(200) {
            debug!(
                code = %check.code,
                msg = check.msg.as_deref().unwrap_or_default(),
                "login code not confirmed yet"
            );
            return Ok(None);
        }
        check
            .ticket
            .filter(|ticket| !ticket.is_empty())
            .map(AuthTicket::new)
            .map(Some)
            .ok_or_else(|| AppError::Parse("confirmed login carried no ticket".into()))
    }

    async fn validate_ticket(&self, ticket: AuthTicket) -> Result<()> {
        let request = HttpRequest::get(&self.endpoints.qr_validate)
            .query("t", ticket.as_str())
            .header("Referer", VALIDATE_REFERER);
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(AppError::AuthFailed(format!(
                "ticket validation returned status {}",
                response.status
            )));
        }

        let body = response.text();
        let validation: ValidationResponse = extract_json(&body)
            .map_err(|err| AppError::AuthFailed(format!("ticket validation unreadable: {err}")))?;
        if validation.return_code.as_i64() == Some(0) {
            Ok(())
        } else {
            Err(AppError::AuthFailed(format!(
                "ticket validation rejected: {}",
                excerpt(&body)
            )))
        }
    }

    fn transition(&mut self, next: AuthState) {
        if !self.state.can_transition_to(next) {
            warn!(from = ?self.state, to = ?next, "unexpected auth transition");
        }
        debug!(from = ?self.state, to = ?next, "auth transition");
        self.state = next;
    }
}
