// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the tabtalk configuration system.

use tabtalk_config::model::TabtalkConfig;
use tabtalk_config::{load_config_from_path, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[agent]
name = "test-host"
log_level = "debug"

[outbox]
upload_timeout_ms = 5000
max_queue_size = 10
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "test-host");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.outbox.upload_timeout_ms, 5000);
    assert_eq!(config.outbox.max_queue_size, 10);
    assert!(config.validate().is_ok());
}

/// An empty document produces the compiled defaults.
#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty TOML should deserialize");
    assert_eq!(config.agent.name, "tabtalk");
    assert_eq!(config.outbox.upload_timeout_ms, 30_000);
    assert_eq!(config.outbox.max_queue_size, 50);
}

/// Partial sections keep defaults for the omitted fields.
#[test]
fn partial_section_keeps_defaults() {
    let toml = r#"
[outbox]
max_queue_size = 3
"#;
    let config = load_config_from_str(toml).expect("partial TOML should deserialize");
    assert_eq!(config.outbox.max_queue_size, 3);
    assert_eq!(config.outbox.upload_timeout_ms, 30_000);
}

/// Unknown keys are rejected rather than silently ignored.
#[test]
fn unknown_field_is_rejected() {
    let toml = r#"
[outbox]
upload_timeout = 5000
"#;
    let err = load_config_from_str(toml).expect_err("unknown key should fail");
    assert!(err.to_string().contains("upload_timeout"));
}

/// Zero-valued limits pass deserialization but fail validation.
#[test]
fn zero_queue_size_fails_validation() {
    let toml = r#"
[outbox]
max_queue_size = 0
"#;
    let config = load_config_from_str(toml).expect("TOML itself is valid");
    let err = config.validate().expect_err("validation should reject 0");
    assert!(err.to_string().contains("max_queue_size"));
}

/// Environment variables override file values via the TABTALK_ prefix.
#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "tabtalk.toml",
            r#"
[outbox]
max_queue_size = 10
"#,
        )?;
        jail.set_env("TABTALK_OUTBOX_MAX_QUEUE_SIZE", "7");
        jail.set_env("TABTALK_AGENT_LOG_LEVEL", "trace");

        let config = load_config_from_path(std::path::Path::new("tabtalk.toml"))
            .expect("config should load");
        assert_eq!(config.outbox.max_queue_size, 7);
        assert_eq!(config.agent.log_level, "trace");
        Ok(())
    });
}

/// Serialize-deserialize round trip through TOML preserves the model.
#[test]
fn config_round_trips_through_toml() {
    let mut config = TabtalkConfig::default();
    config.outbox.upload_timeout_ms = 1234;

    let serialized = toml::to_string(&config).expect("should serialize");
    let back = load_config_from_str(&serialized).expect("should reload");
    assert_eq!(back.outbox.upload_timeout_ms, 1234);
}
