// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the tabtalk message engine.
//!
//! Layered TOML + environment loading via Figment, with
//! `deny_unknown_fields` models and post-load validation.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{AgentConfig, OutboxConfig, TabtalkConfig};
