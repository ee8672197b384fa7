//! Offset between the local clock and the service clock.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::clock::Clock;
use crate::transport::{HttpRequest, Transport};
use crate::wire::{excerpt, extract_json, Scalar};
use crate::{AppError, Result};

#[derive(Debug, Deserialize)]
struct ServerTime {
    #[serde(rename = "currentTime2")]
    current_time: Scalar,
}

/// Measures `local_now - remote_now` with one request.
pub struct ClockSynchronizer {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    url: String,
}

impl ClockSynchronizer {
    /// Synchronizer querying `url` for the service time.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, url: impl Into<String>) -> Self {
        Self {
            transport,
            clock,
            url: url.into(),
        }
    }

    /// Service clock in Unix milliseconds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClockSync` if the request fails, the status is not
    /// 2xx, or the body carries no readable `currentTime2`.
    pub async fn remote_time_ms(&self) -> Result<i64> {
        let response = self
            .transport
            .execute(HttpRequest::get(&self.url))
            .await
            .map_err(|err| AppError::ClockSync(format!("time request failed: {err}")))?;
        if !response.is_success() {
            return Err(AppError::ClockSync(format!(
                "time endpoint returned status {}",
                response.status
            )));
        }

        let body = response.text();
        let time: ServerTime = extract_json(&body)
            .map_err(|err| AppError::ClockSync(format!("unreadable time response: {err}")))?;
        time.current_time.as_i64().ok_or_else(|| {
            AppError::ClockSync(format!("currentTime2 is not a number: {}", excerpt(&body)))
        })
    }

    /// Local clock minus service clock, in milliseconds.
    ///
    /// # Errors
    ///
    /// Propagates [`remote_time_ms`](Self::remote_time_ms) failures; the
    /// offset is never defaulted.
    pub async fn offset(&self) -> Result<i64> {
        let remote_ms = self.remote_time_ms().await?;
        let offset_ms = self.clock.now_ms() - remote_ms;
        info!(offset_ms, "measured offset from service clock");
        Ok(offset_ms)
    }
}
