#![forbid(unsafe_code)]

//! `seckill` — flash-sale checkout client binary.
//!
//! Loads configuration, makes sure every account is logged in, and then
//! either reserves the sku or launches the acquisition worker pool.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use seckill::auth::{QrLogin, SystemImageViewer};
use seckill::clock::{Clock, SystemClock};
use seckill::config::GlobalConfig;
use seckill::orchestrator::{Connector, HttpConnector, Orchestrator, WorkerOutcome};
use seckill::reserve::Reserver;
use seckill::session::SessionStore;
use seckill::transport::HttpTransport;
use seckill::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "seckill", about = "Flash-sale checkout client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Check stored sessions and log in with a login code where needed.
    Login,
    /// Log in, then reserve the configured sku for every account.
    Reserve,
    /// Log in, then run the acquisition worker pool for every account.
    Seckill,
}

impl Command {
    /// Only order submission sends the payment password.
    fn needs_payment_secret(self) -> bool {
        matches!(self, Self::Seckill)
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("seckill bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if args.command.needs_payment_secret() {
        config.load_credentials().await?;
    }
    let config = Arc::new(config);
    info!(
        sku = config.sku_id,
        buy_time = config.buy_time,
        accounts = config.accounts.len(),
        "configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(SessionStore::new(
        config.cookies_dir.clone(),
        Arc::clone(&clock),
    ));

    login_all(&config, &store, &clock).await?;

    match args.command {
        Command::Login => Ok(()),
        Command::Reserve => {
            reserve_all(&config, &store, &clock).await;
            Ok(())
        }
        Command::Seckill => {
            seckill_all(&config, &store, &clock).await;
            Ok(())
        }
    }
}

async fn login_all(
    config: &Arc<GlobalConfig>,
    store: &Arc<SessionStore>,
    clock: &Arc<dyn Clock>,
) -> Result<()> {
    for account in &config.accounts {
        let transport = Arc::new(HttpTransport::new(&account.user_agent, Vec::new())?);
        QrLogin::new(
            account,
            config,
            transport,
            Arc::clone(store),
            Arc::new(SystemImageViewer),
            Arc::clone(clock),
        )
        .login()
        .await
        .inspect_err(|err| error!(username = account.username, %err, "login failed"))?;
    }
    Ok(())
}

async fn reserve_all(config: &Arc<GlobalConfig>, store: &Arc<SessionStore>, clock: &Arc<dyn Clock>) {
    let connector = HttpConnector::new(Arc::clone(store));
    for account in &config.accounts {
        match connector.connect(account) {
            Ok(transport) => {
                Reserver::new(config, account, transport, Arc::clone(clock))
                    .reserve()
                    .await;
            }
            Err(err) => error!(username = account.username, %err, "cannot connect for reservation"),
        }
    }
}

async fn seckill_all(config: &Arc<GlobalConfig>, store: &Arc<SessionStore>, clock: &Arc<dyn Clock>) {
    let orchestrator = Orchestrator::new(
        Arc::clone(config),
        Arc::new(HttpConnector::new(Arc::clone(store))),
        Arc::clone(clock),
    );
    let handles = orchestrator.run_all();
    info!(run_id = orchestrator.run_id(), workers = handles.len(), "worker pool launched");

    // Workers retry until they order or the process is stopped.
    for handle in handles {
        match handle.await {
            Ok(Ok(WorkerOutcome::Ordered(receipt))) => info!(
                order_id = ?receipt.order_id,
                total_money = receipt.total_money,
                pay_url = receipt.pay_url,
                "worker placed an order"
            ),
            Ok(Ok(WorkerOutcome::DryRun)) => {}
            Ok(Err(err)) => error!(%err, "worker exited with error"),
            Err(err) => error!(%err, "worker task panicked"),
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
