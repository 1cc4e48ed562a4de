// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message and upload coordination engine for tabtalk.
//!
//! The [`Outbox`] queues outgoing chat messages that may carry in-flight
//! file uploads and guarantees:
//! - **Strict FIFO dispatch**: messages leave in enqueue order; a blocked
//!   head is never skipped in favor of a later, unblocked message.
//! - **Single-flight**: at most one message is being dispatched at any
//!   instant, enforced under the engine's one state mutex.
//! - **Blocking dependencies**: an anonymous (or explicitly blocking) upload
//!   gates ALL dispatch until it resolves, so the queue cannot race ahead of
//!   something the user is clearly waiting on.
//! - **Bounded stalls**: an upload that never reports back is force-failed
//!   at its deadline by a single reaper task; its message then dispatches
//!   with that attachment omitted.
//! - **Observable drain**: [`Outbox::wait_until_idle`] resolves exactly when
//!   no message and no upload has outstanding work.
//!
//! All state transitions emit [`OutboxEvent`]s on the shared [`EventBus`].
//! The only unbounded suspension point is the caller's dispatch callback,
//! which always runs off the state mutex.

mod payload;
mod reaper;
mod state;

use std::cmp::Reverse;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tabtalk_bus::{EventBus, OutboxEvent};
use tabtalk_config::OutboxConfig;
use tabtalk_core::{
    Attachment, MessageId, MessageStatus, TabtalkError, UploadId, UploadResult, UploadStatus,
};

pub use payload::EMPTY_CONTENT_PLACEHOLDER;
pub use state::{
    DispatchError, DispatchFn, DispatchFuture, MessageSnapshot, OutboxStatus, UploadOptions,
};

use state::{OutboxState, QueuedMessage, UploadEntry};

/// The coordination engine. Cheap to clone; all clones share one state.
///
/// Must be created inside a Tokio runtime (construction spawns the deadline
/// reaper task).
#[derive(Clone)]
pub struct Outbox {
    inner: Arc<OutboxInner>,
}

pub(crate) struct OutboxInner {
    state: Mutex<OutboxState>,
    bus: Arc<EventBus>,
    config: OutboxConfig,
    reaper_wake: Arc<Notify>,
}

impl Drop for OutboxInner {
    fn drop(&mut self) {
        // Unpark the reaper so it observes the dead Weak and exits.
        self.reaper_wake.notify_waiters();
    }
}

impl Outbox {
    /// Create an engine with the given limits and event bus.
    pub fn new(config: OutboxConfig, bus: Arc<EventBus>) -> Self {
        let inner = Arc::new(OutboxInner {
            state: Mutex::new(OutboxState::default()),
            bus,
            config,
            reaper_wake: Arc::new(Notify::new()),
        });
        tokio::spawn(reaper::run(
            Arc::downgrade(&inner),
            Arc::clone(&inner.reaper_wake),
        ));
        Self { inner }
    }

    /// The bus this engine emits on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// The limits this engine was constructed with.
    pub fn config(&self) -> &OutboxConfig {
        &self.inner.config
    }

    // --- Upload reporting API (called by the external uploader) ---

    /// Track a new upload attempt and arm its deadline.
    ///
    /// An anonymous upload (no `message_id`) blocks ALL dispatch by default:
    /// the user started attaching something before composing the message, and
    /// no message should race past it. Override via
    /// [`UploadOptions::blocks_dispatch`].
    pub fn register_upload(
        &self,
        message_id: Option<MessageId>,
        opts: UploadOptions,
    ) -> UploadId {
        let id = UploadId(uuid::Uuid::new_v4().to_string());
        let blocks_dispatch = opts.blocks_dispatch.unwrap_or(message_id.is_none());
        let deadline = Instant::now() + self.inner.config.upload_timeout();

        {
            let mut state = self.lock_state();
            state.uploads.insert(
                id.clone(),
                UploadEntry {
                    message_id: message_id.clone(),
                    status: UploadStatus::Pending,
                    blocks_dispatch,
                    reason: opts.reason,
                    deadline,
                },
            );
            state.deadlines.push(Reverse((deadline, id.clone())));
        }

        debug!(upload_id = %id.0, blocks_dispatch, "upload registered");
        self.inner.reaper_wake.notify_one();
        self.inner.bus.emit(&OutboxEvent::UploadRegistered {
            upload_id: id.clone(),
            message_id,
            blocks_dispatch,
        });
        id
    }

    /// Mark an upload as actively transferring. Unknown ids are ignored.
    pub fn start_upload(&self, id: &UploadId) {
        {
            let mut state = self.lock_state();
            let owner = match state.uploads.get_mut(id) {
                Some(entry) => {
                    entry.status = UploadStatus::Uploading;
                    entry.message_id.clone()
                }
                None => {
                    debug!(upload_id = %id.0, "start for unknown upload, ignoring");
                    return;
                }
            };
            if let Some(slot) = state.slot_mut(id, owner.as_ref()) {
                slot.status = UploadStatus::Uploading;
            }
        }
        self.inner.bus.emit(&OutboxEvent::UploadStarted {
            upload_id: id.clone(),
        });
    }

    /// Record a successful upload and advance the queue. Unknown ids are
    /// ignored (the entry may already have been pruned by cancellation,
    /// clearing, or a timeout).
    pub fn complete_upload(&self, id: &UploadId, result: UploadResult) {
        let event = {
            let mut state = self.lock_state();
            state.complete_upload_entry(id, &result)
        };
        let Some(event) = event else {
            debug!(upload_id = %id.0, "completion for unknown upload, ignoring");
            return;
        };
        debug!(upload_id = %id.0, "upload completed");
        self.inner.bus.emit(&event);
        self.pump();
    }

    /// Record an upload failure and advance the queue.
    ///
    /// The owning message is NOT failed: it dispatches with this attachment
    /// omitted once its remaining slots resolve.
    pub fn fail_upload(&self, id: &UploadId, error: impl Into<String>) {
        let error = error.into();
        let event = {
            let mut state = self.lock_state();
            state.fail_upload_entry(id, error.clone())
        };
        let Some(event) = event else {
            debug!(upload_id = %id.0, "failure for unknown upload, ignoring");
            return;
        };
        warn!(upload_id = %id.0, error = %error, "upload failed");
        self.inner.bus.emit(&event);
        self.pump();
    }

    /// True iff any live upload gates all dispatch.
    pub fn has_blocking_dependencies(&self) -> bool {
        self.lock_state().has_blocking_dependencies()
    }

    // --- Queue control API (called by UI/host code) ---

    /// Queue an outgoing message, optionally citing registered uploads.
    ///
    /// Cited uploads are retroactively re-owned by the new message so a later
    /// completion or failure lands on the right attachment slot; citations of
    /// unknown upload ids are skipped. Fails with
    /// [`TabtalkError::QueueFull`] when the queue is at capacity, mutating
    /// nothing.
    pub fn enqueue_message(
        &self,
        content: impl Into<String>,
        metadata: Option<Map<String, Value>>,
        upload_ids: &[UploadId],
        dispatch: DispatchFn,
    ) -> Result<MessageId, TabtalkError> {
        let content = content.into();
        let id = MessageId(uuid::Uuid::new_v4().to_string());

        {
            let mut state = self.lock_state();
            let limit = self.inner.config.max_queue_size;
            if state.queue.len() >= limit {
                return Err(TabtalkError::QueueFull { limit });
            }

            let mut attachments = Vec::with_capacity(upload_ids.len());
            for upload_id in upload_ids {
                match state.uploads.get_mut(upload_id) {
                    Some(entry) => {
                        entry.message_id = Some(id.clone());
                        attachments.push(Attachment::new(upload_id.clone(), entry.status));
                    }
                    None => {
                        debug!(upload_id = %upload_id.0, "cited upload not in registry, skipping");
                    }
                }
            }

            state.queue.push_back(QueuedMessage {
                id: id.clone(),
                content,
                metadata,
                attachments,
                status: MessageStatus::Queued,
                dispatch: Some(dispatch),
            });
        }

        debug!(message_id = %id.0, "message queued");
        self.inner.bus.emit(&OutboxEvent::MessageQueued {
            message_id: id.clone(),
        });
        self.pump();
        Ok(id)
    }

    /// Remove a queued message and any upload entries it solely owns.
    ///
    /// Refused (returns `false`, no mutation) while the message is being
    /// dispatched, and for unknown ids.
    pub fn cancel_message(&self, id: &MessageId) -> bool {
        {
            let mut state = self.lock_state();
            let Some(pos) = state.queue.iter().position(|m| &m.id == id) else {
                return false;
            };
            if state.queue[pos].status == MessageStatus::Processing {
                return false;
            }
            let Some(msg) = state.queue.remove(pos) else {
                return false;
            };
            for slot in &msg.attachments {
                let solely_owned = state
                    .uploads
                    .get(&slot.upload_id)
                    .is_some_and(|e| e.message_id.as_ref() == Some(id));
                if solely_owned {
                    state.uploads.remove(&slot.upload_id);
                }
            }
            state.check_idle();
        }

        debug!(message_id = %id.0, "message cancelled");
        self.inner.bus.emit(&OutboxEvent::MessageCancelled {
            message_id: id.clone(),
        });
        // Removing a blocked head (and its entries) can unblock the next one.
        self.pump();
        true
    }

    /// Stop starting new dispatches. Uploads keep registering and resolving.
    pub fn pause(&self) {
        self.lock_state().paused = true;
        info!("outbox paused");
        self.inner.bus.emit(&OutboxEvent::QueuePaused);
    }

    /// Resume dispatching and drain whatever became eligible while paused.
    pub fn resume(&self) {
        self.lock_state().paused = false;
        info!("outbox resumed");
        self.inner.bus.emit(&OutboxEvent::QueueResumed);
        self.pump();
    }

    /// Emergency reset: drop all messages, uploads, and deadlines.
    ///
    /// Intended for abnormal recovery, not flow control. An in-flight
    /// dispatch is not interrupted; its late outcome is discarded harmlessly.
    pub fn clear_queue(&self) {
        {
            let mut state = self.lock_state();
            state.queue.clear();
            state.uploads.clear();
            state.deadlines.clear();
            state.processing = None;
            state.check_idle();
        }
        warn!("outbox cleared");
        self.inner.bus.emit(&OutboxEvent::QueueCleared);
    }

    /// Point-in-time counters and flags.
    pub fn status(&self) -> OutboxStatus {
        let state = self.lock_state();
        OutboxStatus {
            queued: state.queue.len(),
            active_uploads: state.uploads.len(),
            blocking_uploads: state
                .uploads
                .values()
                .filter(|e| e.blocks_dispatch && !e.status.is_terminal())
                .count(),
            processing: state.processing.is_some(),
            paused: state.paused,
        }
    }

    /// Snapshot copies of every message still in the queue.
    pub fn queued_messages(&self) -> Vec<MessageSnapshot> {
        self.lock_state()
            .queue
            .iter()
            .map(|m| MessageSnapshot {
                id: m.id.clone(),
                content: m.content.clone(),
                status: m.status,
                attachments: m.attachments.clone(),
            })
            .collect()
    }

    /// True when no message and no upload has outstanding work.
    pub fn is_idle(&self) -> bool {
        self.lock_state().is_idle()
    }

    /// Resolve once the engine is idle; immediately if it already is.
    ///
    /// Every concurrent waiter is released together, under the same critical
    /// section as the transition that produced idleness.
    pub async fn wait_until_idle(&self) {
        let rx = {
            let mut state = self.lock_state();
            if state.is_idle() {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.idle_waiters.push(tx);
            rx
        };
        // A dropped sender (engine cleared mid-wait) also means resolved.
        let _ = rx.await;
    }

    // --- Internals ---

    /// Start a drain pass in the background.
    ///
    /// Called after every state change that can make a message eligible. A
    /// concurrent pass observing the processing marker set returns
    /// immediately, so extra pumps are cheap no-ops.
    fn pump(&self) {
        let outbox = self.clone();
        tokio::spawn(async move { outbox.drain().await });
    }

    /// Dispatch eligible messages until none remain.
    ///
    /// An explicit loop rather than rescheduling: each iteration claims the
    /// head under the lock, awaits the callback off the lock, applies the
    /// outcome, and tries again for the next message.
    async fn drain(self) {
        loop {
            let job = { self.lock_state().next_dispatch() };
            let Some(job) = job else { return };

            self.inner.bus.emit(&OutboxEvent::MessageProcessing {
                message_id: job.id.clone(),
            });
            debug!(message_id = %job.id.0, "dispatching message");

            let outcome = (job.dispatch)(job.content, job.metadata).await;
            if let Err(e) = &outcome {
                warn!(message_id = %job.id.0, error = %e, "dispatch callback failed");
            }

            let event = { self.lock_state().finish_dispatch(&job.id, outcome) };
            self.inner.bus.emit(&event);
        }
    }

    /// Earliest deadline belonging to a still-live upload, pruning stale
    /// heap entries along the way.
    pub(crate) fn next_live_deadline(&self) -> Option<Instant> {
        let mut state = self.lock_state();
        loop {
            let (deadline, live) = match state.deadlines.peek() {
                None => return None,
                Some(Reverse((t, id))) => (*t, state.uploads.contains_key(id)),
            };
            if live {
                return Some(deadline);
            }
            state.deadlines.pop();
        }
    }

    /// Force-fail every live upload whose deadline has passed.
    pub(crate) fn reap_expired(&self, now: Instant) {
        let mut events = Vec::new();
        {
            let mut state = self.lock_state();
            loop {
                let due = match state.deadlines.peek() {
                    Some(Reverse((t, _))) => *t <= now,
                    None => false,
                };
                if !due {
                    break;
                }
                let Some(Reverse((_, id))) = state.deadlines.pop() else {
                    break;
                };
                // Stale heap entries (upload already resolved) fall through.
                let Some(entry) = state.uploads.get(&id) else {
                    continue;
                };
                if entry.deadline > now {
                    continue;
                }
                warn!(
                    upload_id = %id.0,
                    reason = ?entry.reason,
                    "upload deadline passed, force-failing"
                );
                let error = TabtalkError::UploadTimeout {
                    duration: self.inner.config.upload_timeout(),
                }
                .to_string();
                if let Some(event) = state.fail_upload_entry(&id, error) {
                    events.push(event);
                }
            }
        }

        if events.is_empty() {
            return;
        }
        for event in &events {
            self.inner.bus.emit(event);
        }
        self.pump();
    }

    fn lock_state(&self) -> MutexGuard<'_, OutboxState> {
        // Critical sections never run caller code, so poisoning can only come
        // from a panic inside the engine itself; recover rather than spread.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Outbox")
            .field("queued", &status.queued)
            .field("active_uploads", &status.active_uploads)
            .field("processing", &status.processing)
            .field("paused", &status.paused)
            .finish()
    }
}
