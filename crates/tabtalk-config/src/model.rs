// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the tabtalk message engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use tabtalk_core::TabtalkError;

/// Top-level tabtalk configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TabtalkConfig {
    /// Host identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Outbox engine settings.
    #[serde(default)]
    pub outbox: OutboxConfig,
}

impl TabtalkConfig {
    /// Validate cross-field constraints not expressible in serde.
    pub fn validate(&self) -> Result<(), TabtalkError> {
        self.outbox.validate()
    }
}

/// Host identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the host process.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "tabtalk".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Outbox engine configuration.
///
/// Passed to the engine at construction; nothing in the engine is hard-coded.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutboxConfig {
    /// Deadline for an upload to reach a terminal state before it is
    /// force-failed, in milliseconds.
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,

    /// Maximum number of messages the queue will hold.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

impl OutboxConfig {
    /// The upload deadline as a [`Duration`].
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    /// Reject zero-valued limits, which would make the engine inert.
    pub fn validate(&self) -> Result<(), TabtalkError> {
        if self.upload_timeout_ms == 0 {
            return Err(TabtalkError::Config(
                "outbox.upload_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(TabtalkError::Config(
                "outbox.max_queue_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            upload_timeout_ms: default_upload_timeout_ms(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

fn default_upload_timeout_ms() -> u64 {
    30_000
}

fn default_max_queue_size() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TabtalkConfig::default();
        assert_eq!(config.agent.name, "tabtalk");
        assert_eq!(config.agent.log_level, "info");
        assert_eq!(config.outbox.upload_timeout_ms, 30_000);
        assert_eq!(config.outbox.max_queue_size, 50);
    }

    #[test]
    fn upload_timeout_converts_to_duration() {
        let outbox = OutboxConfig {
            upload_timeout_ms: 1500,
            ..Default::default()
        };
        assert_eq!(outbox.upload_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let outbox = OutboxConfig {
            upload_timeout_ms: 0,
            ..Default::default()
        };
        assert!(outbox.validate().is_err());

        let outbox = OutboxConfig {
            max_queue_size: 0,
            ..Default::default()
        };
        assert!(outbox.validate().is_err());

        assert!(OutboxConfig::default().validate().is_ok());
    }
}
