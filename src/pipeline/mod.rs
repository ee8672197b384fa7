//! Three-stage acquisition protocol.
//!
//! Each attempt runs **resolve → open → submit**:
//!
//! - *Resolve* polls the purchase button until it yields a routing url and
//!   rewrites it into the checkout url. It never gives up: the url only
//!   appears once the sale opens.
//! - *Open* hits the checkout url and checkout page without following
//!   redirects. The server-side checkout state is a side effect of the
//!   request; nothing in the response is read.
//! - *Submit* fetches order metadata, posts the order, and classifies the
//!   reply.
//!
//! Any failed attempt (network, parse, or business rejection) is logged,
//! followed by a 0–50 ms backoff, and restarted from *resolve*. Only a
//! successful submission ends [`AcquisitionPipeline::run`].

pub mod order;

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

pub use order::{build_order_form, parse_submit_response, InitInfo, OrderReceipt};

use crate::clock::Clock;
use crate::config::{AccountConfig, Endpoints, GlobalConfig};
use crate::transport::{HttpRequest, Transport};
use crate::wire::{absolute_url, backoff, excerpt, extract_json, jquery_callback};
use crate::{AppError, Result};

/// Minimum backoff between retries, in milliseconds.
const RETRY_BACKOFF_MIN_MS: u64 = 0;
/// Maximum backoff between retries, in milliseconds.
const RETRY_BACKOFF_MAX_MS: u64 = 50;

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Routing url lookup.
    Resolve,
    /// Checkout session establishment.
    Open,
    /// Order metadata fetch and submission.
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "resolve",
            Self::Open => "open",
            Self::Submit => "submit",
        })
    }
}

/// How one attempt ended.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Order placed.
    Success(OrderReceipt),
    /// Service explicitly refused the order.
    BusinessRejected {
        /// Result code reported by the service.
        code: i64,
        /// Message reported by the service.
        message: String,
    },
    /// Network or parse failure.
    TransientError(AppError),
}

/// Result of one resolve → open → submit attempt.
#[derive(Debug)]
pub struct AttemptResult {
    /// Last stage the attempt reached.
    pub stage: Stage,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
}

impl AttemptResult {
    fn failed(stage: Stage, err: AppError) -> Self {
        let outcome = match err {
            AppError::Rejected { code, message } => AttemptOutcome::BusinessRejected { code, message },
            other => AttemptOutcome::TransientError(other),
        };
        Self { stage, outcome }
    }
}

#[derive(Debug, Deserialize)]
struct RoutingResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Rewrite a routing url into the checkout url it redirects to.
///
/// `//divide.jd.com/user_routing?skuId=1&sn=x` becomes
/// `https://marathon.jd.com/captcha.html?skuId=1&sn=x`.
#[must_use]
pub fn checkout_url(routing_url: &str) -> String {
    absolute_url(routing_url)
        .replace("divide", "marathon")
        .replace("user_routing", "captcha.html")
}

/// Acquisition protocol for one worker.
pub struct AcquisitionPipeline {
    sku_id: String,
    account: AccountConfig,
    endpoints: Endpoints,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl AcquisitionPipeline {
    /// Pipeline acquiring `config.sku_id` for `account`.
    #[must_use]
    pub fn new(
        config: &GlobalConfig,
        account: AccountConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sku_id: config.sku_id.clone(),
            account,
            endpoints: config.endpoints.clone(),
            transport,
            clock,
        }
    }

    /// Retry attempts until an order is placed.
    pub async fn run(&self) -> OrderReceipt {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            let result = self.attempt().await;
            match result.outcome {
                AttemptOutcome::Success(receipt) => {
                    info!(
                        attempts,
                        order_id = ?receipt.order_id,
                        total_money = receipt.total_money,
                        pay_url = receipt.pay_url,
                        "order placed"
                    );
                    return receipt;
                }
                AttemptOutcome::BusinessRejected { code, message } => {
                    info!(
                        attempts,
                        stage = %result.stage,
                        code,
                        reason = %message,
                        "order rejected, retrying"
                    );
                }
                AttemptOutcome::TransientError(err) => {
                    warn!(attempts, stage = %result.stage, %err, "attempt failed, retrying");
                }
            }
            self.pause().await;
        }
    }

    /// Run a single resolve → open → submit attempt.
    pub async fn attempt(&self) -> AttemptResult {
        let checkout = self.resolve().await;
        if let Err(err) = self.open(&checkout).await {
            return AttemptResult::failed(Stage::Open, err);
        }
        match self.submit().await {
            Ok(receipt) => AttemptResult {
                stage: Stage::Submit,
                outcome: AttemptOutcome::Success(receipt),
            },
            Err(err) => AttemptResult::failed(Stage::Submit, err),
        }
    }

    /// Poll the purchase button until it yields a checkout url.
    pub async fn resolve(&self) -> String {
        loop {
            match self.request_routing_url().await {
                Ok(Some(routing)) => {
                    let checkout = checkout_url(&routing);
                    info!(checkout, "checkout url resolved");
                    return checkout;
                }
                Ok(None) => info!("checkout url not available yet"),
                Err(err) => warn!(stage = %Stage::Resolve, %err, "routing lookup failed"),
            }
            self.pause().await;
        }
    }

    async fn request_routing_url(&self) -> Result<Option<String>> {
        let request = HttpRequest::get(&self.endpoints.item_button)
            .query("callback", jquery_callback())
            .query("skuId", &self.sku_id)
            .query("from", "pc")
            .query("_", self.clock.now_ms())
            .header("Referer", self.endpoints.item_referer(&self.sku_id));
        let response = self
            .transport
            .execute(request)
            .await?
            .ensure_success("purchase button")?;
        let routing: RoutingResponse = extract_json(&response.text())?;
        Ok(routing.url.filter(|url| !url.is_empty()))
    }

    /// Establish checkout state: checkout url, then checkout page.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Network` if either request cannot be delivered.
    /// Response statuses and bodies are not inspected.
    pub async fn open(&self, checkout: &str) -> Result<()> {
        info!(checkout, "visiting checkout url");
        let referer = self.endpoints.item_referer(&self.sku_id);
        let request = HttpRequest::get(checkout)
            .header("Referer", referer.as_str())
            .without_redirects();
        self.transport.execute(request).await?;

        let request = HttpRequest::get(&self.endpoints.checkout_page)
            .query("skuId", &self.sku_id)
            .query("num", self.account.seckill_num)
            .query("rid", self.clock.now_ms() / 1000)
            .header("Referer", referer)
            .without_redirects();
        self.transport.execute(request).await?;
        Ok(())
    }

    /// Fetch order metadata and submit the order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Network` for delivery failures, `AppError::Parse`
    /// for unreadable bodies, and `AppError::Rejected` when the service
    /// refuses the order.
    pub async fn submit(&self) -> Result<OrderReceipt> {
        let init = self.fetch_init_info().await?;
        let form = build_order_form(&self.sku_id, &self.account, &init)?;

        info!("submitting order");
        let referer = format!(
            "{}?skuId={}&num={}&rid={}",
            self.endpoints.checkout_page,
            self.sku_id,
            self.account.seckill_num,
            self.clock.now_ms() / 1000
        );
        let request = HttpRequest::post(&self.endpoints.order_submit)
            .query("skuId", &self.sku_id)
            .form(form)
            .header("Referer", referer);
        let response = self.transport.execute(request).await?;
        let body = response.text();
        parse_submit_response(&body).inspect_err(|err| {
            if matches!(err, AppError::Parse(_)) {
                warn!(status = response.status, body = excerpt(&body), "unreadable submission reply");
            }
        })
    }

    async fn fetch_init_info(&self) -> Result<InitInfo> {
        let form = vec![
            ("sku".to_owned(), self.sku_id.clone()),
            ("num".to_owned(), self.account.seckill_num.to_string()),
            ("isModifyAddress".to_owned(), "false".to_owned()),
        ];
        let request = HttpRequest::post(&self.endpoints.order_init).form(form);
        let response = self
            .transport
            .execute(request)
            .await?
            .ensure_success("order init")?;
        let body = response.text();
        info!(body = excerpt(&body), "order init received");
        InitInfo::parse(&body)
    }

    async fn pause(&self) {
        self.clock
            .sleep(backoff(RETRY_BACKOFF_MIN_MS, RETRY_BACKOFF_MAX_MS))
            .await;
    }
}
