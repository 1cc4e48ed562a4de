// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the tabtalk message engine.
//!
//! This crate provides the error type and the common id/status/result types
//! shared by the outbox engine, the event bus, and host-facing callers.

pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TabtalkError;
pub use types::{Attachment, MessageId, MessageStatus, UploadId, UploadResult, UploadStatus};
