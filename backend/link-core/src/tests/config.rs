// Unit tests for LinkConfig loading, validation and secret resolution

use crate::commands::VehicleFamily;
use crate::config::{CONFIG_FILE_NAME, LinkConfig, resolve_secret};
use crate::error::config::ConfigError;
use crate::handshake::DigestPolicy;
use crate::{DEFAULT_PLAIN_PORT, DEFAULT_RELAY_HOST, DEFAULT_TLS_PORT};

use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

#[test]
fn given_no_config_file_when_load_then_returns_defaults() {
    // GIVEN
    let dir = TempDir::new().unwrap();

    // WHEN
    let config = LinkConfig::load(dir.path()).unwrap();

    // THEN
    assert_eq!(config.version, 1);
    assert_eq!(config.server.host, DEFAULT_RELAY_HOST);
    assert!(config.server.use_tls);
    assert_eq!(config.protocol.command_timeout, Duration::from_secs(10));
    assert_eq!(config.protocol.keepalive_interval, Duration::from_secs(300));
    assert_eq!(config.protocol.handshake_timeout, Duration::from_secs(30));
    assert_eq!(config.protocol.digest_policy, DigestPolicy::Warn);
    assert_eq!(config.vehicle.secret_env, "OVMS_VEHICLE_PASSWORD");
}

/// **VALUE**: Durations and enums parse from human-friendly TOML.
#[test]
fn given_partial_toml_when_load_then_overrides_and_fills_defaults() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        r#"
[server]
host = "relay.example.org"
use_tls = false

[vehicle]
vehicle_id = "DEMO"
family = "sq"

[protocol]
keepalive_interval = "2m"
command_timeout = "15s"
digest_policy = "enforce"
"#,
    )
    .unwrap();

    // WHEN
    let config = LinkConfig::load(dir.path()).unwrap();

    // THEN
    assert_eq!(config.server.host, "relay.example.org");
    assert_eq!(config.vehicle.vehicle_id, "DEMO");
    assert_eq!(config.vehicle.family, VehicleFamily::Sq);
    assert_eq!(config.protocol.keepalive_interval, Duration::from_secs(120));
    assert_eq!(config.protocol.command_timeout, Duration::from_secs(15));
    assert_eq!(config.protocol.digest_policy, DigestPolicy::Enforce);
    assert_eq!(config.protocol.handshake_timeout, Duration::from_secs(30));
    assert_eq!(config.endpoint().port, DEFAULT_PLAIN_PORT);
}

#[test]
fn given_tls_setting_when_endpoint_then_picks_matching_default_port() {
    let mut config = LinkConfig::default();
    assert_eq!(config.endpoint().port, DEFAULT_TLS_PORT);

    config.server.port = Some(7000);
    assert_eq!(config.endpoint().port, 7000);
    assert!(config.endpoint().use_tls);
}

#[test]
fn given_broken_toml_when_load_then_returns_parse_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[server\nhost = ").unwrap();

    let result = LinkConfig::load(dir.path());

    assert!(matches!(result, Err(ConfigError::ParseError { .. })));
}

#[test]
fn given_bad_duration_when_load_then_returns_parse_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "[protocol]\ncommand_timeout = \"soon\"\n",
    )
    .unwrap();

    assert!(matches!(
        LinkConfig::load(dir.path()),
        Err(ConfigError::ParseError { .. })
    ));
}

/// **BUG THIS CATCHES**: A zero keepalive would spin the keepalive loop.
#[test]
fn given_invalid_values_when_validate_then_returns_validation_error() {
    let mut zero_keepalive = LinkConfig::default();
    zero_keepalive.protocol.keepalive_interval = Duration::ZERO;
    assert!(matches!(
        zero_keepalive.validate(),
        Err(ConfigError::ValidationError { .. })
    ));

    let mut spaced_vehicle = LinkConfig::default();
    spaced_vehicle.vehicle.vehicle_id = "MY CAR".into();
    assert!(spaced_vehicle.validate().is_err());

    let mut future_version = LinkConfig::default();
    future_version.version = 99;
    assert!(future_version.validate().is_err());

    let mut inverted_backoff = LinkConfig::default();
    inverted_backoff.reconnect.max_delay = Duration::from_millis(1);
    assert!(inverted_backoff.validate().is_err());
}

#[test]
fn given_unconfigured_vehicle_when_require_vehicle_then_fails() {
    let mut config = LinkConfig::default();
    assert!(config.require_vehicle().is_err());

    config.vehicle.vehicle_id = "DEMO".into();
    assert_eq!(config.require_vehicle().unwrap(), "DEMO");
}

#[test]
fn given_saved_config_when_loaded_then_values_survive() {
    let dir = TempDir::new().unwrap();
    let mut config = LinkConfig::default();
    config.vehicle.vehicle_id = "DEMO".into();
    config.protocol.keepalive_interval = Duration::from_secs(90);

    let path = config.save(dir.path()).unwrap();
    let loaded = LinkConfig::load(dir.path()).unwrap();

    assert!(path.ends_with(CONFIG_FILE_NAME));
    assert_eq!(loaded.vehicle.vehicle_id, "DEMO");
    assert_eq!(loaded.protocol.keepalive_interval, Duration::from_secs(90));
    assert!(!dir.path().join(format!("{CONFIG_FILE_NAME}.tmp")).exists());
}

// ============================================
// SECRET RESOLUTION
// ============================================

/// **VALUE**: The password comes from the named environment variable.
#[test]
#[serial]
fn given_env_var_set_when_resolve_secret_then_returns_redacted_secret() {
    // SAFETY: serialized with every other test touching the environment.
    unsafe { std::env::set_var("OVMS_LINK_TEST_SECRET", "hunter2") };

    let secret = resolve_secret("OVMS_LINK_TEST_SECRET").unwrap();

    assert_eq!(secret.expose_bytes(), b"hunter2");
    assert!(!format!("{secret:?}").contains("hunter2"));
    unsafe { std::env::remove_var("OVMS_LINK_TEST_SECRET") };
}

#[test]
#[serial]
fn given_env_var_missing_or_empty_when_resolve_secret_then_returns_secret_missing() {
    unsafe { std::env::remove_var("OVMS_LINK_TEST_MISSING") };
    assert!(matches!(
        resolve_secret("OVMS_LINK_TEST_MISSING"),
        Err(ConfigError::SecretMissing { .. })
    ));

    unsafe { std::env::set_var("OVMS_LINK_TEST_MISSING", "") };
    assert!(matches!(
        resolve_secret("OVMS_LINK_TEST_MISSING"),
        Err(ConfigError::SecretMissing { .. })
    ));
    unsafe { std::env::remove_var("OVMS_LINK_TEST_MISSING") };
}

#[test]
fn given_config_and_secret_when_session_settings_then_carries_protocol_values() {
    let mut config = LinkConfig::default();
    config.vehicle.vehicle_id = "DEMO".into();
    config.protocol.digest_policy = DigestPolicy::Enforce;

    let settings = config.session_settings(common::RedactedSecret::new("pw"));

    assert_eq!(settings.vehicle_id, "DEMO");
    assert_eq!(settings.digest_policy, DigestPolicy::Enforce);
    assert_eq!(settings.keepalive_interval, config.protocol.keepalive_interval);
    assert_eq!(settings.endpoint, config.endpoint());
}
