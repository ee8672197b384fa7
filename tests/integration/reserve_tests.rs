use std::sync::Arc;

use seckill::clock::{Clock, ManualClock};
use seckill::config::GlobalConfig;
use seckill::reserve::Reserver;
use seckill::transport::Transport;
use seckill::AppError;

use super::test_helpers::{test_account, test_config, ScriptedTransport};

const RESERVE_URL: &str = "https://yushou.test/toYuyue.action?sku=100012043978&key=k1";
const RESERVE_BODY: &str =
    r#"fetchJSON({"url":"//yushou.test/toYuyue.action?sku=100012043978&key=k1","state":2})"#;

fn reserver(
    config: &GlobalConfig,
    transport: &Arc<ScriptedTransport>,
    clock: &Arc<ManualClock>,
) -> Reserver {
    Reserver::new(
        config,
        &test_account(config),
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::clone(clock) as Arc<dyn Clock>,
    )
}

#[tokio::test]
async fn reservation_visits_returned_url() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), false);
    let transport = ScriptedTransport::new();
    let clock = Arc::new(ManualClock::new(1_000));
    transport.reply(&config.endpoints.reserve_info, 200, RESERVE_BODY);
    transport.reply(RESERVE_URL, 200, "<html>reserved</html>");

    reserver(&config, &transport, &clock)
        .make_reservation()
        .await
        .expect("reserved");

    let info = &transport.requests_to(&config.endpoints.reserve_info)[0];
    assert_eq!(info.query_value("callback"), Some("fetchJSON"));
    assert_eq!(info.query_value("sku"), Some("100012043978"));
    assert_eq!(info.query_value("_"), Some("1000"));
    assert_eq!(transport.requests_to(RESERVE_URL).len(), 1);
}

#[tokio::test]
async fn missing_url_is_parse_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), false);
    let transport = ScriptedTransport::new();
    let clock = Arc::new(ManualClock::new(1_000));
    transport.reply(&config.endpoints.reserve_info, 200, r#"fetchJSON({"state":4})"#);

    let err = reserver(&config, &transport, &clock)
        .make_reservation()
        .await
        .expect_err("no url");
    assert!(matches!(err, AppError::Parse(_)));
}

#[tokio::test]
async fn reserve_retries_until_registered() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), false);
    let transport = ScriptedTransport::new();
    let clock = Arc::new(ManualClock::new(1_000));
    let info_url = config.endpoints.reserve_info.clone();
    transport.fail(&info_url, "connection reset");
    transport.reply(&info_url, 200, "<html>busy</html>");
    transport.reply(&info_url, 200, RESERVE_BODY);
    transport.reply(RESERVE_URL, 200, "");

    reserver(&config, &transport, &clock).reserve().await;

    assert_eq!(transport.requests_to(&info_url).len(), 3);
    assert_eq!(transport.requests_to(RESERVE_URL).len(), 1);
    assert_eq!(clock.sleep_count(), 2);
}
