// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal queue/registry state and its transition logic.
//!
//! All fields live behind the engine's single mutex; external callers only
//! ever receive ids or snapshot copies, never references into this state.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;

use tabtalk_bus::OutboxEvent;
use tabtalk_core::{Attachment, MessageId, MessageStatus, UploadId, UploadResult, UploadStatus};

use crate::payload::build_payload;

/// Error produced by a caller-supplied dispatch callback.
pub type DispatchError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by a dispatch callback.
pub type DispatchFuture = BoxFuture<'static, Result<(), DispatchError>>;

/// Caller-supplied send function, invoked at most once per message with the
/// final content and metadata once every attachment is resolved and the
/// message is at the head of an unblocked queue.
pub type DispatchFn =
    Box<dyn FnOnce(String, Option<Map<String, Value>>) -> DispatchFuture + Send>;

/// Options accepted by `register_upload`.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Free-form diagnostic label for the registration.
    pub reason: Option<String>,
    /// Whether this upload blocks ALL dispatch while non-terminal.
    /// Defaults to `true` for anonymous uploads (no message id), `false`
    /// otherwise.
    pub blocks_dispatch: Option<bool>,
}

/// Point-in-time view of the engine, returned by `Outbox::status`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxStatus {
    pub queued: usize,
    pub active_uploads: usize,
    pub blocking_uploads: usize,
    pub processing: bool,
    pub paused: bool,
}

/// Owned snapshot of one queued message, returned by
/// `Outbox::queued_messages`.
#[derive(Debug, Clone, Serialize)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub content: String,
    pub status: MessageStatus,
    pub attachments: Vec<Attachment>,
}

/// A live upload attempt. Only non-terminal entries are kept; completion or
/// failure propagates into the owning attachment slot and prunes the entry.
pub(crate) struct UploadEntry {
    pub message_id: Option<MessageId>,
    pub status: UploadStatus,
    pub blocks_dispatch: bool,
    pub reason: Option<String>,
    pub deadline: Instant,
}

/// A message waiting in (or being dispatched from) the queue.
pub(crate) struct QueuedMessage {
    pub id: MessageId,
    pub content: String,
    pub metadata: Option<Map<String, Value>>,
    pub attachments: Vec<Attachment>,
    pub status: MessageStatus,
    /// Taken exactly once, when the message transitions to processing.
    pub dispatch: Option<DispatchFn>,
}

/// Everything `next_dispatch` extracts so the callback can run off the lock.
pub(crate) struct DispatchJob {
    pub id: MessageId,
    pub content: String,
    pub metadata: Option<Map<String, Value>>,
    pub dispatch: DispatchFn,
}

/// The single-owner engine state.
#[derive(Default)]
pub(crate) struct OutboxState {
    pub queue: VecDeque<QueuedMessage>,
    pub uploads: HashMap<UploadId, UploadEntry>,
    /// Deadline-ordered min-heap serviced by the reaper task. Entries for
    /// already-pruned uploads are skipped lazily on pop.
    pub deadlines: BinaryHeap<Reverse<(Instant, UploadId)>>,
    /// Id of the message currently being dispatched, if any. Identity-checked
    /// on completion so a `clear_queue` during dispatch cannot corrupt a
    /// subsequently started dispatch.
    pub processing: Option<MessageId>,
    pub paused: bool,
    pub idle_waiters: Vec<oneshot::Sender<()>>,
}

impl OutboxState {
    /// True iff any live entry must resolve before ANY message may dispatch.
    pub fn has_blocking_dependencies(&self) -> bool {
        self.uploads
            .values()
            .any(|e| e.blocks_dispatch && !e.status.is_terminal())
    }

    /// No queued/processing messages and no live upload entries.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.uploads.is_empty()
    }

    /// Release every idle waiter, exactly once each, if the engine is idle.
    ///
    /// Must be called inside the same critical section as the transition
    /// that may have produced idleness.
    pub fn check_idle(&mut self) {
        if !self.is_idle() {
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// Find the attachment slot mirroring `upload_id`.
    ///
    /// When the entry knows its owner, the slot is looked up on that message;
    /// otherwise the first queued message citing the id wins (orphaned
    /// attachment reconciliation).
    pub fn slot_mut(
        &mut self,
        upload_id: &UploadId,
        owner: Option<&MessageId>,
    ) -> Option<&mut Attachment> {
        match owner {
            Some(message_id) => self
                .queue
                .iter_mut()
                .find(|m| &m.id == message_id)
                .and_then(|m| m.attachments.iter_mut().find(|a| &a.upload_id == upload_id)),
            None => self
                .queue
                .iter_mut()
                .find_map(|m| m.attachments.iter_mut().find(|a| &a.upload_id == upload_id)),
        }
    }

    /// Apply a successful upload result: propagate into the mirroring slot,
    /// prune the entry, and re-check idleness. `None` for unknown ids.
    pub fn complete_upload_entry(
        &mut self,
        id: &UploadId,
        result: &UploadResult,
    ) -> Option<OutboxEvent> {
        let entry = self.uploads.remove(id)?;
        let owner = entry.message_id;
        if let Some(slot) = self.slot_mut(id, owner.as_ref()) {
            slot.complete(result);
        }
        self.check_idle();
        Some(OutboxEvent::UploadCompleted {
            upload_id: id.clone(),
            message_id: owner,
        })
    }

    /// Apply an upload failure. The owning message is NOT failed; the slot is
    /// marked failed and will be omitted from the outgoing payload.
    pub fn fail_upload_entry(&mut self, id: &UploadId, error: String) -> Option<OutboxEvent> {
        let entry = self.uploads.remove(id)?;
        let owner = entry.message_id;
        if let Some(slot) = self.slot_mut(id, owner.as_ref()) {
            slot.fail(error.clone());
        }
        self.check_idle();
        Some(OutboxEvent::UploadFailed {
            upload_id: id.clone(),
            message_id: owner,
            error,
        })
    }

    /// Steps 1-6 of the dispatch algorithm.
    ///
    /// Returns the job to run off the lock, or `None` when nothing is
    /// eligible: already processing, paused, a blocking dependency is live,
    /// the queue is empty, or the head message still has unresolved slots
    /// (strict FIFO: a blocked head is never skipped).
    pub fn next_dispatch(&mut self) -> Option<DispatchJob> {
        if self.processing.is_some() || self.paused {
            return None;
        }
        if self.has_blocking_dependencies() {
            return None;
        }
        let msg = self.queue.front_mut()?;
        if msg.attachments.iter().any(|a| !a.status.is_terminal()) {
            return None;
        }
        let dispatch = msg.dispatch.take()?;
        msg.status = MessageStatus::Processing;
        self.processing = Some(msg.id.clone());
        let (content, metadata) =
            build_payload(&msg.content, msg.metadata.as_ref(), &msg.attachments);
        Some(DispatchJob {
            id: msg.id.clone(),
            content,
            metadata,
            dispatch,
        })
    }

    /// Steps 8-10: apply the dispatch outcome, release entries owned by the
    /// message, remove it from the queue, and re-check idleness.
    pub fn finish_dispatch(
        &mut self,
        id: &MessageId,
        outcome: Result<(), DispatchError>,
    ) -> OutboxEvent {
        if self.processing.as_ref() == Some(id) {
            self.processing = None;
        }
        if let Some(pos) = self.queue.iter().position(|m| &m.id == id) {
            self.queue.remove(pos);
        }
        // Entries re-owned to this message but never resolved as slots would
        // otherwise outlive it and hold the engine non-idle until timeout.
        self.uploads.retain(|_, e| e.message_id.as_ref() != Some(id));
        let event = match outcome {
            Ok(()) => OutboxEvent::MessageSent {
                message_id: id.clone(),
            },
            Err(e) => OutboxEvent::MessageFailed {
                message_id: id.clone(),
                error: e.to_string(),
            },
        };
        self.check_idle();
        event
    }
}
