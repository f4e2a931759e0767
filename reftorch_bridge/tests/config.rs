use reftorch_bridge::config::CONFIG_ENV;
use reftorch_bridge::logging::log_filter;
use reftorch_bridge::{BridgeConfig, ConfigError, Session};
use reftorch_native::{BackendKind, DEFAULT_MAX_ELEMENTS};
use tempfile::tempdir;

#[test]
fn empty_file_gives_defaults() {
    let cfg = BridgeConfig::from_toml_str("").expect("parse");
    assert_eq!(cfg, BridgeConfig::default());
    assert_eq!(cfg.backend_kind().unwrap(), BackendKind::Cpu);
    assert_eq!(cfg.max_elements, DEFAULT_MAX_ELEMENTS);
}

#[test]
fn every_field_is_read() {
    let cfg = BridgeConfig::from_toml_str(
        r#"
backend = "ndarray"
device = "cpu"
seed = 42
max_elements = 4096
log_filter = "reftorch_bridge=debug"
"#,
    )
    .expect("parse");
    assert_eq!(cfg.backend_kind().unwrap(), BackendKind::Cpu);
    assert_eq!(cfg.seed, 42);
    assert_eq!(cfg.max_elements, 4096);
    assert_eq!(cfg.log_filter, "reftorch_bridge=debug");
}

#[test]
fn invalid_values_are_rejected() {
    assert!(matches!(
        BridgeConfig::from_toml_str("backend = \"tpu\""),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        BridgeConfig::from_toml_str("max_elements = 0"),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        BridgeConfig::from_toml_str("log_filter = \"reftorch_bridge=loud\""),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        BridgeConfig::from_toml_str("colour = \"blue\""),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        BridgeConfig::load("/definitely/not/here.toml"),
        Err(ConfigError::Read { .. })
    ));
}

#[test]
fn env_variable_names_the_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bridge.toml");
    std::fs::write(&path, "seed = 7\n").expect("write");
    std::env::set_var(CONFIG_ENV, &path);
    let cfg = BridgeConfig::from_env();
    std::env::remove_var(CONFIG_ENV);
    assert_eq!(cfg.expect("from env").seed, 7);
}

#[test]
fn session_follows_config() {
    let cfg = BridgeConfig::from_toml_str("max_elements = 16").unwrap();
    let mut session = Session::from_config(&cfg).expect("cpu session");
    assert_eq!(session.kind(), BackendKind::Cpu);
    let err = session
        .call(
            "TZeros",
            &reftorch_bridge::ExprBuilder::new().list(&[5, 5]).build(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        reftorch_bridge::BridgeError::ResourceExhausted(_)
    ));
    assert_eq!(session.live_count(), 0);
}

#[cfg(not(feature = "torch"))]
#[test]
fn torch_backend_needs_the_feature() {
    let cfg = BridgeConfig::from_toml_str("backend = \"torch\"").unwrap();
    assert!(matches!(
        Session::from_config(&cfg),
        Err(ConfigError::BackendUnavailable(_))
    ));
}

#[test]
fn configured_log_filter_reaches_the_subscriber() {
    let cfg = BridgeConfig::from_toml_str("log_filter = \"reftorch_bridge=debug\"").unwrap();
    if std::env::var_os("RUST_LOG").is_none() {
        assert_eq!(log_filter(&cfg.log_filter).to_string(), "reftorch_bridge=debug");
    }
    Session::from_config(&cfg).expect("cpu session");
    assert!(tracing::dispatcher::has_been_set());
    // a second session leaves the installed subscriber alone
    Session::from_config(&BridgeConfig::default()).expect("cpu session");
    assert!(!reftorch_bridge::init_logging("warn"));
}
