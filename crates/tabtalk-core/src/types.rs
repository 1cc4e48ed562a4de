// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared between the outbox engine, the event bus, and callers.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Unique identifier for an in-flight upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UploadId(pub String);

/// Lifecycle states of an upload attempt.
///
/// `Completed` and `Failed` are terminal and mutually exclusive. A timeout
/// forces `Failed` from any non-terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl UploadStatus {
    /// True for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

/// Lifecycle states of a queued message.
///
/// `Processing` is transient and held by at most one message system-wide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Processing,
    Sent,
    Failed,
}

/// Provider-agnostic reference to a completed upload.
///
/// Reported by the external uploader on completion; at least one of
/// `file_uri` / `file_id` must be present for the attachment to be merged
/// into an outgoing payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub file_uri: Option<String>,
    pub file_id: Option<String>,
    pub mime_type: Option<String>,
    pub preview: Option<String>,
}

impl UploadResult {
    /// True when the result carries a usable remote reference.
    pub fn has_reference(&self) -> bool {
        self.file_uri.as_deref().is_some_and(|s| !s.is_empty())
            || self.file_id.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// A message's view of one cited upload.
///
/// Snapshotted from the registry entry at enqueue time and updated in place
/// as the upload progresses. Once the registry entry is pruned, this is the
/// only place the upload's outcome remains visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub upload_id: UploadId,
    pub status: UploadStatus,
    pub file_uri: Option<String>,
    pub file_id: Option<String>,
    pub mime_type: Option<String>,
    pub preview: Option<String>,
    pub error: Option<String>,
}

impl Attachment {
    /// A fresh slot mirroring an upload that has produced no result yet.
    pub fn new(upload_id: UploadId, status: UploadStatus) -> Self {
        Self {
            upload_id,
            status,
            file_uri: None,
            file_id: None,
            mime_type: None,
            preview: None,
            error: None,
        }
    }

    /// Apply a successful upload result to this slot.
    pub fn complete(&mut self, result: &UploadResult) {
        self.status = UploadStatus::Completed;
        self.file_uri = result.file_uri.clone();
        self.file_id = result.file_id.clone();
        self.mime_type = result.mime_type.clone();
        self.preview = result.preview.clone();
        self.error = None;
    }

    /// Mark this slot failed. The owning message still dispatches; the slot
    /// is simply omitted from the outgoing payload.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = UploadStatus::Failed;
        self.error = Some(error.into());
    }

    /// True when the slot is completed and carries a usable remote reference.
    pub fn is_sendable(&self) -> bool {
        self.status == UploadStatus::Completed
            && (self.file_uri.as_deref().is_some_and(|s| !s.is_empty())
                || self.file_id.as_deref().is_some_and(|s| !s.is_empty()))
    }
}
