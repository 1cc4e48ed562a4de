// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tabtalk.toml` > `~/.config/tabtalk/tabtalk.toml`
//! > `/etc/tabtalk/tabtalk.toml` with environment variable overrides via the
//! `TABTALK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TabtalkConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tabtalk/tabtalk.toml` (system-wide)
/// 3. `~/.config/tabtalk/tabtalk.toml` (user XDG config)
/// 4. `./tabtalk.toml` (local directory)
/// 5. `TABTALK_*` environment variables
pub fn load_config() -> Result<TabtalkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TabtalkConfig::default()))
        .merge(Toml::file("/etc/tabtalk/tabtalk.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("tabtalk/tabtalk.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("tabtalk.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<TabtalkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TabtalkConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TabtalkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TabtalkConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `TABTALK_OUTBOX_MAX_QUEUE_SIZE` must map
/// to `outbox.max_queue_size`, not `outbox.max.queue.size`.
fn env_provider() -> Env {
    Env::prefixed("TABTALK_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: TABTALK_OUTBOX_MAX_QUEUE_SIZE -> "outbox_max_queue_size"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("outbox_", "outbox.", 1);
        mapped.into()
    })
}
