//! Sale reservation.
//!
//! Accounts must reserve a sku before the sale opens to be eligible. The
//! reservation endpoint hands back a url; visiting it registers (or
//! confirms) the reservation.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, info_span, warn, Instrument};

use crate::clock::Clock;
use crate::config::{AccountConfig, Endpoints, GlobalConfig};
use crate::transport::{HttpRequest, Transport};
use crate::wire::{absolute_url, backoff, extract_json};
use crate::{AppError, Result};

#[derive(Debug, Deserialize)]
struct ReserveInfo {
    #[serde(default)]
    url: Option<String>,
}

/// Reserves a sku for one account.
pub struct Reserver {
    sku_id: String,
    username: String,
    endpoints: Endpoints,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl Reserver {
    /// Reserver for `config.sku_id` on behalf of `account`.
    #[must_use]
    pub fn new(
        config: &GlobalConfig,
        account: &AccountConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sku_id: config.sku_id.clone(),
            username: account.username.clone(),
            endpoints: config.endpoints.clone(),
            transport,
            clock,
        }
    }

    /// Retry [`make_reservation`](Self::make_reservation) until it succeeds.
    pub async fn reserve(&self) {
        let span = info_span!("reserve", username = %self.username, sku = %self.sku_id);
        async {
            let mut attempts: u64 = 0;
            loop {
                attempts += 1;
                match self.make_reservation().await {
                    Ok(()) => {
                        info!(attempts, "reservation registered");
                        return;
                    }
                    Err(err) => warn!(attempts, %err, "reservation failed, retrying"),
                }
                self.clock.sleep(backoff(10, 100)).await;
            }
        }
        .instrument(span)
        .await;
    }

    /// Fetch the reservation url and visit it once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Network` if a request cannot be delivered and
    /// `AppError::Parse` if the reservation info holds no url.
    pub async fn make_reservation(&self) -> Result<()> {
        let request = HttpRequest::get(&self.endpoints.reserve_info)
            .query("callback", "fetchJSON")
            .query("sku", &self.sku_id)
            .query("_", self.clock.now_ms())
            .header("Referer", self.endpoints.item_referer(&self.sku_id));
        let response = self
            .transport
            .execute(request)
            .await?
            .ensure_success("reservation info")?;

        let info: ReserveInfo = extract_json(&response.text())?;
        let url = info
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AppError::Parse("reservation info carried no url".into()))?;

        self.transport
            .execute(HttpRequest::get(absolute_url(&url)))
            .await?;
        Ok(())
    }
}
