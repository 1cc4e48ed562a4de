// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deadline reaper: one background task per engine that force-fails uploads
//! which have not reached a terminal state by their deadline.
//!
//! Deadlines live in a min-heap inside the engine state; there is no timer
//! per upload. Entries whose upload already resolved are skipped lazily when
//! they surface at the top of the heap, so normal completion cancels its
//! deadline without bookkeeping and a deadline can never fire twice.

use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};

use crate::{Outbox, OutboxInner};

/// Run until the owning engine is dropped.
///
/// Holds only a `Weak` reference between wake-ups; the engine's `Drop`
/// notifies `wake` so a parked reaper observes the dead reference and exits.
pub(crate) async fn run(inner: Weak<OutboxInner>, wake: Arc<Notify>) {
    loop {
        let next = {
            let Some(strong) = inner.upgrade() else { return };
            Outbox { inner: strong }.next_live_deadline()
        };

        match next {
            // Nothing registered; park until a registration (or Drop) wakes us.
            None => wake.notified().await,
            Some(at) => {
                tokio::select! {
                    _ = sleep_until(at) => {
                        let Some(strong) = inner.upgrade() else { return };
                        Outbox { inner: strong }.reap_expired(Instant::now());
                    }
                    // An earlier deadline may have been registered; re-evaluate.
                    _ = wake.notified() => {}
                }
            }
        }
    }
}
