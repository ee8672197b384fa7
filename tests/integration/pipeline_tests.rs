use std::sync::Arc;

use seckill::clock::{Clock, ManualClock};
use seckill::config::GlobalConfig;
use seckill::pipeline::{AcquisitionPipeline, AttemptOutcome, Stage};
use seckill::transport::{Method, Transport};
use seckill::AppError;

use super::test_helpers::{
    script_checkout, test_account, test_config, ScriptedTransport, CHECKOUT_URL, ORDER_BODY,
};

struct Harness {
    _temp: tempfile::TempDir,
    config: GlobalConfig,
    transport: Arc<ScriptedTransport>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path(), false);
        Self {
            _temp: temp,
            config,
            transport: ScriptedTransport::new(),
            clock: Arc::new(ManualClock::new(1_605_855_600_000)),
        }
    }

    fn pipeline(&self) -> AcquisitionPipeline {
        AcquisitionPipeline::new(
            &self.config,
            test_account(&self.config),
            Arc::clone(&self.transport) as Arc<dyn Transport>,
            Arc::clone(&self.clock) as Arc<dyn Clock>,
        )
    }
}

#[tokio::test]
async fn resolve_polls_until_url_appears() {
    let harness = Harness::new();
    let button = harness.config.endpoints.item_button.clone();
    for _ in 0..4 {
        harness.transport.reply(&button, 200, "jQuery1234567({})");
    }
    harness.transport.reply(&button, 200, r#"jQuery1234567({"url":""})"#);
    script_checkout(&harness.transport, &harness.config);

    let checkout = harness.pipeline().resolve().await;

    assert_eq!(checkout, CHECKOUT_URL);
    let lookups = harness.transport.requests_to(&button);
    assert_eq!(lookups.len(), 6);
    assert_eq!(lookups[0].query_value("skuId"), Some("100012043978"));
    assert_eq!(lookups[0].query_value("from"), Some("pc"));
    assert_eq!(
        lookups[0].header_value("referer"),
        Some("https://item.test/100012043978.html")
    );
    assert_eq!(harness.clock.sleep_count(), 5);
}

#[tokio::test]
async fn resolve_survives_transport_failures() {
    let harness = Harness::new();
    let button = harness.config.endpoints.item_button.clone();
    harness.transport.fail(&button, "connection reset");
    harness.transport.reply(&button, 502, "");
    script_checkout(&harness.transport, &harness.config);

    let checkout = harness.pipeline().resolve().await;

    assert_eq!(checkout, CHECKOUT_URL);
    assert_eq!(harness.transport.requests_to(&button).len(), 3);
}

#[tokio::test]
async fn open_visits_resolved_url_then_checkout_page() {
    let harness = Harness::new();
    script_checkout(&harness.transport, &harness.config);

    harness.pipeline().open(CHECKOUT_URL).await.expect("open succeeds");

    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url, CHECKOUT_URL);
    assert!(!requests[0].follow_redirects);
    assert_eq!(requests[1].url, harness.config.endpoints.checkout_page);
    assert!(!requests[1].follow_redirects);
    assert_eq!(requests[1].query_value("num"), Some("2"));
    assert_eq!(requests[1].query_value("rid"), Some("1605855600"));
}

#[tokio::test]
async fn successful_attempt_submits_order_form() {
    let harness = Harness::new();
    script_checkout(&harness.transport, &harness.config);

    let result = harness.pipeline().attempt().await;

    assert_eq!(result.stage, Stage::Submit);
    let AttemptOutcome::Success(receipt) = result.outcome else {
        panic!("expected success, got {:?}", result.outcome);
    };
    assert_eq!(receipt.order_id, Some(820_227_001));
    assert_eq!(receipt.pay_url, "https://pay.test/x");

    let endpoints = &harness.config.endpoints;
    let init = &harness.transport.requests_to(&endpoints.order_init)[0];
    assert_eq!(init.method, Method::Post);
    assert_eq!(init.form_value("sku"), Some("100012043978"));
    assert_eq!(init.form_value("isModifyAddress"), Some("false"));

    let submit = &harness.transport.requests_to(&endpoints.order_submit)[0];
    assert_eq!(submit.method, Method::Post);
    assert_eq!(submit.query_value("skuId"), Some("100012043978"));
    assert_eq!(submit.form_value("token"), Some("tok"));
    assert_eq!(submit.form_value("eid"), Some("EID-A"));
    assert_eq!(submit.form_value("password"), Some("123456"));
    assert!(submit
        .header_value("Referer")
        .is_some_and(|referer| referer.starts_with(&endpoints.checkout_page)));

    let urls: Vec<String> = harness
        .transport
        .requests()
        .into_iter()
        .map(|request| request.url)
        .collect();
    assert_eq!(
        urls,
        vec![
            endpoints.item_button.clone(),
            CHECKOUT_URL.to_owned(),
            endpoints.checkout_page.clone(),
            endpoints.order_init.clone(),
            endpoints.order_submit.clone(),
        ]
    );
}

#[tokio::test]
async fn rejected_submission_reports_business_rejection() {
    let harness = Harness::new();
    let submit = harness.config.endpoints.order_submit.clone();
    harness.transport.reply(
        &submit,
        200,
        r#"{"success":false,"resultCode":60074,"errorMessage":"no stock"}"#,
    );
    script_checkout(&harness.transport, &harness.config);

    let result = harness.pipeline().attempt().await;

    assert_eq!(result.stage, Stage::Submit);
    match result.outcome {
        AttemptOutcome::BusinessRejected { code, message } => {
            assert_eq!(code, 60074);
            assert_eq!(message, "no stock");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn open_failure_is_transient_at_open_stage() {
    let harness = Harness::new();
    let button = harness.config.endpoints.item_button.clone();
    harness.transport.fallback(
        &button,
        200,
        r#"jQuery1({"url":"//divide.test/user_routing?skuId=1&sn=unscripted"})"#,
    );

    let result = harness.pipeline().attempt().await;

    assert_eq!(result.stage, Stage::Open);
    assert!(matches!(
        result.outcome,
        AttemptOutcome::TransientError(AppError::Network(_))
    ));
}

#[tokio::test]
async fn run_retries_from_resolve_after_parse_error() {
    let harness = Harness::new();
    let endpoints = harness.config.endpoints.clone();
    harness
        .transport
        .reply(&endpoints.order_submit, 200, "<html>too busy</html>");
    script_checkout(&harness.transport, &harness.config);

    let receipt = harness.pipeline().run().await;

    assert_eq!(receipt.order_id, Some(820_227_001));
    assert_eq!(harness.transport.requests_to(&endpoints.item_button).len(), 2);
    assert_eq!(harness.transport.requests_to(&endpoints.order_submit).len(), 2);
}

#[tokio::test]
async fn run_retries_after_rejection_then_succeeds() {
    let harness = Harness::new();
    let endpoints = harness.config.endpoints.clone();
    for _ in 0..3 {
        harness.transport.reply(
            &endpoints.order_submit,
            200,
            r#"{"success":false,"resultCode":60017,"errorMessage":"busy"}"#,
        );
    }
    harness.transport.reply(&endpoints.order_submit, 200, ORDER_BODY);
    script_checkout(&harness.transport, &harness.config);

    let receipt = harness.pipeline().run().await;

    assert_eq!(receipt.total_money, "99.00");
    assert_eq!(harness.transport.requests_to(&endpoints.item_button).len(), 4);
    assert_eq!(harness.transport.requests_to(&endpoints.order_init).len(), 4);
    assert_eq!(harness.clock.sleep_count(), 3);
}

#[tokio::test]
async fn confirmed_order_without_id_is_not_resubmitted() {
    let harness = Harness::new();
    let endpoints = harness.config.endpoints.clone();
    harness.transport.reply(
        &endpoints.order_submit,
        200,
        r#"{"success":true,"totalMoney":"99.00","pcUrl":"//pay.test/x"}"#,
    );
    script_checkout(&harness.transport, &harness.config);

    let receipt = harness.pipeline().run().await;

    assert_eq!(receipt.order_id, None);
    assert_eq!(harness.transport.requests_to(&endpoints.order_submit).len(), 1);
}
