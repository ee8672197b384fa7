use std::sync::Arc;

use seckill::clock::{Clock, ManualClock};
use seckill::config::GlobalConfig;
use seckill::orchestrator::{Connector, Orchestrator, WorkerOutcome};
use seckill::AppError;

use super::test_helpers::{script_checkout, test_account, test_config, ScriptedConnector};

const REMOTE_MS: i64 = 1_605_855_600_000;

fn time_body() -> String {
    format!(r#"{{"currentTime":"2020-11-20 15:00:00","currentTime2":"{REMOTE_MS}"}}"#)
}

fn orchestrator(config: GlobalConfig, connector: &Arc<ScriptedConnector>) -> Orchestrator {
    Orchestrator::new(
        Arc::new(config),
        Arc::clone(connector) as Arc<dyn Connector>,
        Arc::new(ManualClock::new(REMOTE_MS)) as Arc<dyn Clock>,
    )
}

#[tokio::test]
async fn run_returns_handles_before_workers_start() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), true);
    let account = test_account(&config);
    let time_url = config.endpoints.time.clone();
    let connector = ScriptedConnector::new(move |transport| {
        transport.fallback(&time_url, 200, &time_body());
    });

    let orchestrator = orchestrator(config, &connector);
    let handles = orchestrator.run(&account, 5);

    // Current-thread runtime: nothing spawned has run yet.
    assert_eq!(handles.len(), 5);
    assert_eq!(connector.connect_count(), 0);

    for handle in handles {
        let outcome = handle.await.expect("worker joins").expect("worker succeeds");
        assert_eq!(outcome, WorkerOutcome::DryRun);
    }
    assert_eq!(connector.connect_count(), 5);
}

#[tokio::test]
async fn workers_get_independent_transports() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), true);
    let account = test_account(&config);
    let time_url = config.endpoints.time.clone();
    let connector = ScriptedConnector::new(move |transport| {
        transport.fallback(&time_url, 200, &time_body());
    });

    let orchestrator = orchestrator(config, &connector);
    for handle in orchestrator.run(&account, 3) {
        handle.await.expect("worker joins").expect("worker succeeds");
    }

    let transports = connector.transports();
    assert_eq!(transports.len(), 3);
    for transport in &transports {
        assert_eq!(transport.requests().len(), 1);
    }
}

#[tokio::test]
async fn debug_workers_send_no_purchase_requests() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), true);
    let account = test_account(&config);
    let script_config = config.clone();
    let connector = ScriptedConnector::new(move |transport| {
        transport.fallback(&script_config.endpoints.time, 200, &time_body());
        script_checkout(transport, &script_config);
    });

    let orchestrator = orchestrator(config.clone(), &connector);
    for handle in orchestrator.run(&account, 2) {
        handle.await.expect("worker joins").expect("worker succeeds");
    }

    for transport in connector.transports() {
        assert!(transport.requests_to(&config.endpoints.item_button).is_empty());
        assert!(transport.requests_to(&config.endpoints.order_submit).is_empty());
    }
}

#[tokio::test]
async fn live_worker_places_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), false);
    let account = test_account(&config);
    let script_config = config.clone();
    let connector = ScriptedConnector::new(move |transport| {
        transport.fallback(&script_config.endpoints.time, 200, &time_body());
        script_checkout(transport, &script_config);
    });

    let orchestrator = orchestrator(config, &connector);
    let handles = orchestrator.run(&account, 1);
    let outcome = handles
        .into_iter()
        .next()
        .expect("one handle")
        .await
        .expect("worker joins")
        .expect("worker succeeds");

    let WorkerOutcome::Ordered(receipt) = outcome else {
        panic!("expected an order, got {outcome:?}");
    };
    assert_eq!(receipt.order_id, Some(820_227_001));
}

#[tokio::test]
async fn clock_sync_failure_stops_worker() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), true);
    let account = test_account(&config);
    let connector = ScriptedConnector::new(|_| {});

    let orchestrator = orchestrator(config, &connector);
    let handles = orchestrator.run(&account, 2);

    for handle in handles {
        let err = handle.await.expect("worker joins").expect_err("sync fails");
        assert!(matches!(err, AppError::ClockSync(_)));
    }
}

#[tokio::test]
async fn run_all_spawns_work_count_per_account() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), true);
    let time_url = config.endpoints.time.clone();
    let work_count = config.work_count;
    let connector = ScriptedConnector::new(move |transport| {
        transport.fallback(&time_url, 200, &time_body());
    });

    let orchestrator = orchestrator(config, &connector);
    assert!(!orchestrator.run_id().is_empty());
    let handles = orchestrator.run_all();

    assert_eq!(handles.len(), work_count);
    for handle in handles {
        handle.await.expect("worker joins").expect("worker succeeds");
    }
}
