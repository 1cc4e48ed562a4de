// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the tabtalk message engine.

use thiserror::Error;

/// The primary error type used across the tabtalk workspace.
///
/// Asynchronous failures (upload timeouts, dispatch rejections) are never
/// returned from unrelated call stacks; they surface only through the event
/// bus and per-entity status fields. Operations on unknown message or upload
/// ids are no-ops, not errors.
#[derive(Debug, Error)]
pub enum TabtalkError {
    /// Configuration errors (invalid TOML, out-of-range values, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// The outgoing message queue is at capacity; nothing was enqueued.
    #[error("message queue is full (limit {limit})")]
    QueueFull { limit: usize },

    /// An upload exceeded its deadline and was force-failed.
    #[error("upload timed out after {duration:?}")]
    UploadTimeout { duration: std::time::Duration },

    /// A caller-supplied dispatch callback rejected the message.
    #[error("dispatch failed: {message}")]
    Dispatch {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
