use crate::config::{BridgeConfig, ENV_HOST, ENV_PORT};
use crate::error::ConfigError;

use serial_test::serial;
use tempfile::TempDir;

#[test]
fn given_missing_file_when_loading_then_defaults() {
    let dir = TempDir::new().unwrap();

    let config = BridgeConfig::load(dir.path()).unwrap();

    assert_eq!(config, BridgeConfig::default());
    assert_eq!(config.server.address(), "localhost:5005");
}

/// **VALUE**: Verifies that a saved config loads back unchanged.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - A field is skipped during serialization
/// - The temp file is left behind instead of renamed
#[test]
fn given_saved_config_when_loaded_then_identical() {
    // GIVEN: A non-default config saved to disk
    let dir = TempDir::new().unwrap();
    let mut config = BridgeConfig::default();
    config.server.port = 6001;
    config.retry.max_attempts = 5;
    config.history.max_records = 10;
    config.save(dir.path()).unwrap();

    // WHEN: Loading it
    let loaded = BridgeConfig::load(dir.path()).unwrap();

    // THEN: Same values, no temp file
    assert_eq!(loaded, config);
    assert!(!dir.path().join("bridge.json.tmp").exists());
}

#[test]
fn given_partial_file_when_loading_then_missing_fields_defaulted() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bridge.json"), r#"{"server": {"port": 7000}}"#).unwrap();

    let config = BridgeConfig::load(dir.path()).unwrap();

    assert_eq!(config.server.port, 7000);
    assert_eq!(config.server.host, "localhost");
    assert_eq!(config.dispatch.max_per_tick, 10);
}

#[test]
fn given_corrupt_file_when_loading_then_parse_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bridge.json"), "{ not json").unwrap();

    let result = BridgeConfig::load(dir.path());

    assert!(matches!(result, Err(ConfigError::ParseError { .. })));
}

#[test]
fn given_invalid_values_when_validating_then_rejected() {
    let cases: Vec<fn(&mut BridgeConfig)> = vec![
        |c| c.version = 0,
        |c| c.server.port = 0,
        |c| c.client.read_timeout_ms = 0,
        |c| c.dispatch.max_per_tick = 0,
        |c| c.retry.max_attempts = 0,
        |c| c.retry.initial_delay_ms = 20_000,
        |c| c.retry.exponential_base = 0.5,
        |c| c.history.max_records = 0,
    ];

    for mutate in cases {
        let mut config = BridgeConfig::default();
        mutate(&mut config);
        assert!(
            matches!(config.validate(), Err(ConfigError::ValidationError { .. })),
            "expected rejection for {config:?}"
        );
    }
}

#[test]
fn given_invalid_config_when_saving_then_nothing_written() {
    let dir = TempDir::new().unwrap();
    let mut config = BridgeConfig::default();
    config.server.port = 0;

    assert!(config.save(dir.path()).is_err());
    assert!(!dir.path().join("bridge.json").exists());
}

#[test]
#[serial]
fn given_env_overrides_when_applied_then_server_address_replaced() {
    // GIVEN: Host and port set in the environment
    unsafe {
        std::env::set_var(ENV_HOST, "127.0.0.1");
        std::env::set_var(ENV_PORT, "6006");
    }
    let mut config = BridgeConfig::default();

    // WHEN: Applying overrides
    let result = config.apply_env_overrides();
    unsafe {
        std::env::remove_var(ENV_HOST);
        std::env::remove_var(ENV_PORT);
    }

    // THEN: Both values replaced
    result.unwrap();
    assert_eq!(config.server.address(), "127.0.0.1:6006");
}

#[test]
#[serial]
fn given_bad_port_in_env_when_applied_then_environment_error() {
    unsafe { std::env::set_var(ENV_PORT, "not-a-port") };
    let mut config = BridgeConfig::default();

    let result = config.apply_env_overrides();
    unsafe { std::env::remove_var(ENV_PORT) };

    assert!(matches!(
        result,
        Err(ConfigError::EnvironmentError { variable: ENV_PORT, .. })
    ));
}

#[test]
fn given_config_when_converting_then_runtime_options_match() {
    let config = BridgeConfig::default();

    let options = config.dispatch_options();
    let retry = config.retry.to_retry_config();

    assert_eq!(options.max_per_tick, 10);
    assert_eq!(options.tick_interval.as_millis(), 100);
    assert_eq!(retry.max_attempts, 3);
    assert_eq!(retry.initial_delay.as_millis(), 500);
}
