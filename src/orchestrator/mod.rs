//! Worker pool orchestration.
//!
//! [`Orchestrator::run`] spawns a fixed number of independent workers per
//! account and hands back their join handles without waiting. Workers share
//! nothing but the immutable configuration: each one connects its own
//! transport, measures its own clock offset, and draws its own lead. One
//! worker placing an order does not stop its siblings.

pub mod worker;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub use worker::{Connector, HttpConnector, Worker, WorkerOutcome};

use crate::clock::Clock;
use crate::config::{AccountConfig, GlobalConfig};
use crate::Result;

/// Handle to one spawned worker.
pub type WorkerHandle = JoinHandle<Result<WorkerOutcome>>;

/// Spawns worker pools.
pub struct Orchestrator {
    config: Arc<GlobalConfig>,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    run_id: String,
}

impl Orchestrator {
    /// Orchestrator building workers from `config`.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            connector,
            clock,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Identifier attached to every worker span of this orchestrator.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Spawn `worker_count` workers for `account` and return immediately.
    #[must_use]
    pub fn run(&self, account: &AccountConfig, worker_count: usize) -> Vec<WorkerHandle> {
        info!(
            run_id = self.run_id,
            username = account.username,
            worker_count,
            "spawning workers"
        );
        (0..worker_count)
            .map(|index| {
                let worker = Worker::new(
                    index,
                    Arc::clone(&self.config),
                    account.clone(),
                    Arc::clone(&self.connector),
                    Arc::clone(&self.clock),
                );
                let span = info_span!(
                    "worker",
                    run_id = %self.run_id,
                    username = %account.username,
                    worker = index
                );
                tokio::spawn(worker.run().instrument(span))
            })
            .collect()
    }

    /// Spawn `work_count` workers for every configured account.
    #[must_use]
    pub fn run_all(&self) -> Vec<WorkerHandle> {
        self.config
            .accounts
            .iter()
            .flat_map(|account| self.run(account, self.config.work_count))
            .collect()
    }
}
