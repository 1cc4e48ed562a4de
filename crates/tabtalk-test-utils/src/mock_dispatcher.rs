// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock dispatcher for deterministic testing.
//!
//! `MockDispatcher` produces [`DispatchFn`]s that capture the final
//! `(content, metadata)` payloads for assertion, with scriptable success,
//! failure, and artificial latency.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, Notify};

use tabtalk_outbox::DispatchFn;

/// One captured dispatch invocation.
#[derive(Debug, Clone)]
pub struct SentPayload {
    pub content: String,
    pub metadata: Option<Map<String, Value>>,
}

/// A scriptable sink for dispatch callbacks.
///
/// Every [`DispatchFn`] handed out by [`dispatch_fn`](Self::dispatch_fn)
/// records its payload here on invocation and then resolves according to the
/// dispatcher's script: `Ok` by default, `Err` after [`fail_with`](Self::fail_with),
/// optionally after [`delay`](Self::delay).
#[derive(Clone, Default)]
pub struct MockDispatcher {
    sent: Arc<Mutex<Vec<SentPayload>>>,
    fail_with: Arc<Mutex<Option<String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    notify: Arc<Notify>,
}

impl MockDispatcher {
    /// Create a dispatcher that accepts everything immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent callback resolve with this error.
    pub async fn fail_with(&self, error: impl Into<String>) {
        *self.fail_with.lock().await = Some(error.into());
    }

    /// Make subsequent callbacks succeed again.
    pub async fn succeed(&self) {
        *self.fail_with.lock().await = None;
    }

    /// Hold each subsequent callback open for `duration` before resolving.
    pub async fn delay(&self, duration: Duration) {
        *self.delay.lock().await = Some(duration);
    }

    /// Produce a dispatch callback wired to this dispatcher.
    pub fn dispatch_fn(&self) -> DispatchFn {
        let sent = Arc::clone(&self.sent);
        let fail_with = Arc::clone(&self.fail_with);
        let delay = Arc::clone(&self.delay);
        let notify = Arc::clone(&self.notify);

        Box::new(move |content, metadata| {
            Box::pin(async move {
                if let Some(duration) = *delay.lock().await {
                    tokio::time::sleep(duration).await;
                }
                sent.lock().await.push(SentPayload { content, metadata });
                notify.notify_waiters();
                match fail_with.lock().await.clone() {
                    Some(error) => Err(error.into()),
                    None => Ok(()),
                }
            })
        })
    }

    /// All payloads captured so far, in dispatch order.
    pub async fn sent(&self) -> Vec<SentPayload> {
        self.sent.lock().await.clone()
    }

    /// Number of payloads captured so far.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Wait until at least `count` payloads have been captured.
    ///
    /// Callers should wrap this in `tokio::time::timeout`.
    pub async fn wait_for_sends(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before the check so a send between the check and the
            // await cannot be missed.
            notified.as_mut().enable();
            if self.sent.lock().await.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

/// A one-off dispatch callback that always succeeds.
pub fn ok_dispatch() -> DispatchFn {
    Box::new(|_, _| Box::pin(async { Ok(()) }))
}

/// A one-off dispatch callback that always fails with `error`.
pub fn failing_dispatch(error: impl Into<String>) -> DispatchFn {
    let error = error.into();
    Box::new(move |_, _| Box::pin(async move { Err(error.into()) }))
}
