//! Unit tests for `AppError` display format and conversions.

use agent_bridge::AppError;

#[test]
fn display_uses_variant_prefix() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Bridge("stdin closed".into()), "bridge: stdin closed"),
        (
            AppError::InvalidRequest("prompt must not be empty".into()),
            "invalid request: prompt must not be empty",
        ),
        (AppError::Unsupported("resume".into()), "unsupported: resume"),
        (AppError::Io("denied".into()), "io: denied"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn messages_have_no_trailing_period() {
    let err = AppError::Bridge("write failed".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("missing file")));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let parse = toml::from_str::<toml::Value>("key = ").expect_err("invalid toml");
    let err: AppError = parse.into();
    assert!(err.to_string().starts_with("config: invalid config:"));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    let err = AppError::Config("x".into());
    assert_error(&err);
    assert!(format!("{err:?}").contains("Config"));
}
