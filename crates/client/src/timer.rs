//! Schedulable timers.
//!
//! Backoff retries and polling ticks are never slept on inline. Components ask a
//! [`Scheduler`] to deliver a [`TimerEvent`] later; the expiry arrives as a
//! [`SessionEvent::Timer`] on the session channel like any other input, and the
//! component that armed it checks the [`TimerId`] before acting.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::session::{EventSender, SessionEvent};

/// Identifies one scheduled expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Backoff elapsed; open the next push connection.
    Reconnect,
    /// Polling fallback interval elapsed.
    Poll,
}

/// "Run this after N ms" / "cancel" capability.
pub trait Scheduler {
    fn schedule(&self, after: Duration, event: TimerEvent) -> TimerId;

    /// Cancel a pending expiry. Cancelling a fired or unknown id is a no-op.
    fn cancel(&self, id: TimerId);
}

/// Scheduler backed by Tokio's timer wheel.
pub struct TokioScheduler {
    events: EventSender,
    next_id: Cell<u64>,
    pending: RefCell<HashMap<TimerId, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            next_id: Cell::new(0),
            pending: RefCell::new(HashMap::new()),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, after: Duration, event: TimerEvent) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.unbounded_send(SessionEvent::Timer { id, event });
        });

        let mut pending = self.pending.borrow_mut();
        pending.retain(|_, task| !task.is_finished());
        pending.insert(id, task);
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(task) = self.pending.borrow_mut().remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.pending.get_mut().drain() {
            task.abort();
        }
    }
}
