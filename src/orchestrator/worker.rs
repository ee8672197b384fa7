//! A single acquisition worker.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info};

use crate::clock::Clock;
use crate::config::{AccountConfig, GlobalConfig};
use crate::pipeline::{AcquisitionPipeline, OrderReceipt};
use crate::session::SessionStore;
use crate::timing::{draw_lead_ms, ClockSynchronizer, Scheduler, TargetWindow};
use crate::transport::{HttpTransport, Transport};
use crate::Result;

/// Builds a fresh transport for a worker.
///
/// Called once per worker so no two workers share cookie state.
pub trait Connector: Send + Sync {
    /// Build a transport authenticated as `account`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored session cannot be read or the client
    /// cannot be built.
    fn connect(&self, account: &AccountConfig) -> Result<Arc<dyn Transport>>;
}

/// Connects real HTTP transports seeded from the session store.
///
/// The stored session is only read; workers never write it back.
pub struct HttpConnector {
    store: Arc<SessionStore>,
}

impl HttpConnector {
    /// Connector reading sessions from `store`.
    #[must_use]
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

impl Connector for HttpConnector {
    fn connect(&self, account: &AccountConfig) -> Result<Arc<dyn Transport>> {
        let cookies = match self.store.load(&account.username)? {
            Some(session) => session.cookies,
            None => {
                info!("no valid stored session, connecting anonymously");
                Vec::new()
            }
        };
        Ok(Arc::new(HttpTransport::new(&account.user_agent, cookies)?))
    }
}

/// How a worker finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Order placed.
    Ordered(OrderReceipt),
    /// Debug dry run completed without purchase requests.
    DryRun,
}

/// One independent acquisition worker.
pub struct Worker {
    index: usize,
    config: Arc<GlobalConfig>,
    account: AccountConfig,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
}

impl Worker {
    /// Worker number `index` for `account`.
    #[must_use]
    pub fn new(
        index: usize,
        config: Arc<GlobalConfig>,
        account: AccountConfig,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            index,
            config,
            account,
            connector,
            clock,
        }
    }

    /// Connect, sync, wait for the window, then acquire.
    ///
    /// # Errors
    ///
    /// Returns the connector's error or `AppError::ClockSync` when the
    /// offset cannot be measured. Acquisition itself never fails; it
    /// retries until an order is placed.
    pub async fn run(self) -> Result<WorkerOutcome> {
        let result = self.execute().await;
        match &result {
            Ok(WorkerOutcome::Ordered(receipt)) => {
                info!(worker = self.index, order_id = ?receipt.order_id, "worker finished");
            }
            Ok(WorkerOutcome::DryRun) => info!(worker = self.index, "worker finished dry run"),
            Err(err) => error!(worker = self.index, %err, "worker stopped"),
        }
        result
    }

    async fn execute(&self) -> Result<WorkerOutcome> {
        let transport = self.connector.connect(&self.account)?;

        let offset_ms = ClockSynchronizer::new(
            Arc::clone(&transport),
            Arc::clone(&self.clock),
            &self.config.endpoints.time,
        )
        .offset()
        .await?;
        let window = TargetWindow::new(self.config.buy_time_ms, offset_ms, draw_lead_ms());

        Scheduler::new(Arc::clone(&self.clock))
            .with_poll_interval(self.config.poll_interval())
            .wait_for(&window)
            .await;

        if self.config.debug {
            let pause = Duration::from_secs(rand::thread_rng().gen_range(1..=5));
            self.clock.sleep(pause).await;
            info!(username = self.account.username, "debug mode, dry run over");
            return Ok(WorkerOutcome::DryRun);
        }

        let pipeline = AcquisitionPipeline::new(
            &self.config,
            self.account.clone(),
            transport,
            Arc::clone(&self.clock),
        );
        Ok(WorkerOutcome::Ordered(pipeline.run().await))
    }
}
