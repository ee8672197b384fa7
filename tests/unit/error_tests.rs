//! `AppError` display format and retry classification.

use seckill::AppError;

#[test]
fn display_uses_category_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Io("x".into()), "io: x"),
        (AppError::Network("x".into()), "network: x"),
        (AppError::Parse("x".into()), "parse: x"),
        (AppError::AuthExpired("x".into()), "auth expired: x"),
        (AppError::AuthFailed("x".into()), "auth failed: x"),
        (AppError::ClockSync("x".into()), "clock sync: x"),
        (AppError::Session("x".into()), "session: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn rejection_display_includes_code_and_message() {
    let err = AppError::Rejected {
        code: 60074,
        message: "no stock".into(),
    };
    assert_eq!(err.to_string(), "rejected: [60074] no stock");
}

#[test]
fn pipeline_errors_are_retryable() {
    assert!(AppError::Network("timeout".into()).is_retryable());
    assert!(AppError::Parse("not json".into()).is_retryable());
    assert!(AppError::Rejected {
        code: 60017,
        message: "too fast".into()
    }
    .is_retryable());
}

#[test]
fn auth_and_clock_errors_are_not_retryable() {
    assert!(!AppError::AuthExpired("code expired".into()).is_retryable());
    assert!(!AppError::AuthFailed("rejected".into()).is_retryable());
    assert!(!AppError::ClockSync("unreachable".into()).is_retryable());
    assert!(!AppError::Config("bad".into()).is_retryable());
}

#[test]
fn json_errors_convert_to_parse() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    let err: AppError = json_err.into();
    assert!(matches!(err, AppError::Parse(_)));
}

#[test]
fn io_errors_convert_to_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: AppError = io_err.into();
    assert_eq!(err.to_string(), "io: denied");
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    let err = AppError::Network("reset".into());
    assert_error(&err);
    assert!(format!("{err:?}").contains("Network"));
}
