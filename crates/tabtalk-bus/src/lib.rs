// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal typed event bus for the tabtalk message engine.
//!
//! The outbox emits an [`OutboxEvent`] for every upload and message lifecycle
//! transition. Subscribers register a handler per [`EventKind`]; a handler
//! that panics is caught and logged, never propagated, so one broken
//! observer cannot disturb the emitter or other subscribers. A given
//! subscriber sees events in emission order; no ordering is guaranteed
//! across distinct subscribers.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use strum::{Display, EnumString};
use tracing::warn;

use tabtalk_core::{MessageId, UploadId};

/// Named event kinds, used as subscription keys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    UploadRegistered,
    UploadStarted,
    UploadCompleted,
    UploadFailed,
    MessageQueued,
    MessageProcessing,
    MessageSent,
    MessageFailed,
    MessageCancelled,
    QueuePaused,
    QueueResumed,
    QueueCleared,
}

/// A single upload or message lifecycle event with its payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutboxEvent {
    #[serde(rename_all = "camelCase")]
    UploadRegistered {
        upload_id: UploadId,
        message_id: Option<MessageId>,
        blocks_dispatch: bool,
    },
    #[serde(rename_all = "camelCase")]
    UploadStarted { upload_id: UploadId },
    #[serde(rename_all = "camelCase")]
    UploadCompleted {
        upload_id: UploadId,
        message_id: Option<MessageId>,
    },
    #[serde(rename_all = "camelCase")]
    UploadFailed {
        upload_id: UploadId,
        message_id: Option<MessageId>,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    MessageQueued { message_id: MessageId },
    #[serde(rename_all = "camelCase")]
    MessageProcessing { message_id: MessageId },
    #[serde(rename_all = "camelCase")]
    MessageSent { message_id: MessageId },
    #[serde(rename_all = "camelCase")]
    MessageFailed { message_id: MessageId, error: String },
    #[serde(rename_all = "camelCase")]
    MessageCancelled { message_id: MessageId },
    QueuePaused,
    QueueResumed,
    QueueCleared,
}

impl OutboxEvent {
    /// The subscription key this event is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            OutboxEvent::UploadRegistered { .. } => EventKind::UploadRegistered,
            OutboxEvent::UploadStarted { .. } => EventKind::UploadStarted,
            OutboxEvent::UploadCompleted { .. } => EventKind::UploadCompleted,
            OutboxEvent::UploadFailed { .. } => EventKind::UploadFailed,
            OutboxEvent::MessageQueued { .. } => EventKind::MessageQueued,
            OutboxEvent::MessageProcessing { .. } => EventKind::MessageProcessing,
            OutboxEvent::MessageSent { .. } => EventKind::MessageSent,
            OutboxEvent::MessageFailed { .. } => EventKind::MessageFailed,
            OutboxEvent::MessageCancelled { .. } => EventKind::MessageCancelled,
            OutboxEvent::QueuePaused => EventKind::QueuePaused,
            OutboxEvent::QueueResumed => EventKind::QueueResumed,
            OutboxEvent::QueueCleared => EventKind::QueueCleared,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&OutboxEvent) + Send + Sync>;

/// Fan-out publisher for [`OutboxEvent`]s.
///
/// Handlers run synchronously on the emitting thread, in registration order
/// per kind. Emission never fails: a panicking handler is isolated via
/// `catch_unwind` and logged at `warn`.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&OutboxEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.lock_subscribers();
        subscribers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        for handlers in subscribers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(hid, _)| *hid == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver `event` to every subscriber of its kind.
    pub fn emit(&self, event: &OutboxEvent) {
        // Snapshot the handler list so subscribers may (un)subscribe from
        // inside a handler without deadlocking.
        let handlers: Vec<Handler> = {
            let subscribers = self.lock_subscribers();
            subscribers
                .get(&event.kind())
                .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(kind = %event.kind(), "event subscriber panicked; ignoring");
            }
        }
    }

    /// Number of live subscriptions for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock_subscribers()
            .get(&kind)
            .map_or(0, |hs| hs.len())
    }

    fn lock_subscribers(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<EventKind, Vec<(SubscriptionId, Handler)>>> {
        // A panicking handler runs outside the lock, so poisoning can only
        // come from a panic in the bus itself; recover rather than propagate.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn sent_event() -> OutboxEvent {
        OutboxEvent::MessageSent {
            message_id: MessageId("m-1".into()),
        }
    }

    #[test]
    fn subscriber_receives_matching_kind_only() {
        let bus = EventBus::new();
        let seen: Arc<StdMutex<Vec<EventKind>>> = Arc::default();

        let seen_clone = Arc::clone(&seen);
        bus.subscribe(EventKind::MessageSent, move |e| {
            seen_clone.lock().unwrap().push(e.kind());
        });

        bus.emit(&sent_event());
        bus.emit(&OutboxEvent::QueuePaused);

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::MessageSent]);
    }

    #[test]
    fn events_arrive_in_emission_order() {
        let bus = EventBus::new();
        let seen: Arc<StdMutex<Vec<String>>> = Arc::default();

        let seen_clone = Arc::clone(&seen);
        bus.subscribe(EventKind::MessageQueued, move |e| {
            if let OutboxEvent::MessageQueued { message_id } = e {
                seen_clone.lock().unwrap().push(message_id.0.clone());
            }
        });

        for i in 0..5 {
            bus.emit(&OutboxEvent::MessageQueued {
                message_id: MessageId(format!("m-{i}")),
            });
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["m-0", "m-1", "m-2", "m-3", "m-4"]
        );
    }

    #[test]
    fn panicking_subscriber_does_not_disturb_others() {
        let bus = EventBus::new();
        let seen: Arc<StdMutex<u32>> = Arc::default();

        bus.subscribe(EventKind::MessageSent, |_| {
            panic!("broken observer");
        });
        let seen_clone = Arc::clone(&seen);
        bus.subscribe(EventKind::MessageSent, move |_| {
            *seen_clone.lock().unwrap() += 1;
        });

        bus.emit(&sent_event());
        bus.emit(&sent_event());

        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen: Arc<StdMutex<u32>> = Arc::default();

        let seen_clone = Arc::clone(&seen);
        let id = bus.subscribe(EventKind::MessageSent, move |_| {
            *seen_clone.lock().unwrap() += 1;
        });

        bus.emit(&sent_event());
        assert!(bus.unsubscribe(id));
        bus.emit(&sent_event());

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(bus.subscriber_count(EventKind::MessageSent), 0);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn subscribing_from_inside_a_handler_does_not_deadlock() {
        let bus = Arc::new(EventBus::new());

        let bus_clone = Arc::clone(&bus);
        bus.subscribe(EventKind::QueueCleared, move |_| {
            bus_clone.subscribe(EventKind::QueuePaused, |_| {});
        });

        bus.emit(&OutboxEvent::QueueCleared);
        assert_eq!(bus.subscriber_count(EventKind::QueuePaused), 1);
    }

    #[test]
    fn event_kind_display_round_trips() {
        use std::str::FromStr;

        let kinds = [
            EventKind::UploadRegistered,
            EventKind::UploadStarted,
            EventKind::UploadCompleted,
            EventKind::UploadFailed,
            EventKind::MessageQueued,
            EventKind::MessageProcessing,
            EventKind::MessageSent,
            EventKind::MessageFailed,
            EventKind::MessageCancelled,
            EventKind::QueuePaused,
            EventKind::QueueResumed,
            EventKind::QueueCleared,
        ];
        assert_eq!(kinds.len(), 12, "EventKind must have exactly 12 variants");

        for kind in kinds {
            let parsed = EventKind::from_str(&kind.to_string()).expect("should parse back");
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn event_kind_matches_variant() {
        let e = OutboxEvent::UploadFailed {
            upload_id: UploadId("u-1".into()),
            message_id: None,
            error: "timeout".into(),
        };
        assert_eq!(e.kind(), EventKind::UploadFailed);
        assert_eq!(e.kind().to_string(), "uploadFailed");
    }

    #[test]
    fn events_serialize_with_camel_case_tags() {
        let e = OutboxEvent::UploadRegistered {
            upload_id: UploadId("u-1".into()),
            message_id: Some(MessageId("m-1".into())),
            blocks_dispatch: true,
        };
        let json = serde_json::to_value(&e).expect("should serialize");
        assert_eq!(json["kind"], "uploadRegistered");
        assert_eq!(json["uploadId"], "u-1");
        assert_eq!(json["blocksDispatch"], true);
    }

    #[tokio::test]
    async fn emission_from_spawned_tasks_is_delivered() {
        let bus = Arc::new(EventBus::new());
        let seen: Arc<StdMutex<u32>> = Arc::default();

        let seen_clone = Arc::clone(&seen);
        bus.subscribe(EventKind::MessageSent, move |_| {
            *seen_clone.lock().unwrap() += 1;
        });

        let mut handles = Vec::new();
        for _ in 0..4 {
            let bus = Arc::clone(&bus);
            handles.push(tokio::spawn(async move {
                bus.emit(&sent_event());
            }));
        }
        for h in handles {
            h.await.expect("emit task should not panic");
        }

        assert_eq!(*seen.lock().unwrap(), 4);
    }
}
