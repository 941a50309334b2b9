//! Deterministic stand-ins for the network and the clock.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use notifier_shared::{ApiError, Notification, NotificationPage, NotificationType};
use url::Url;

use crate::service::NotificationApi;
use crate::session::SessionEvent;
use crate::stream::{PushTransport, TransportError, TransportHandle, TransportSink};
use crate::timer::{Scheduler, TimerEvent, TimerId};

pub(crate) fn notification(id: &str, read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        kind: NotificationType::Commission,
        title: format!("Notification {}", id),
        message: "body".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        read,
    }
}

/// A `notification` stream frame.
pub(crate) fn notification_json(id: &str, read: bool) -> String {
    serde_json::json!({ "type": "notification", "data": notification(id, read) }).to_string()
}

// --- Clock ---

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_id: u64,
    pending: Vec<(Duration, TimerId, TimerEvent)>,
}

/// Scheduler whose time only moves when a test calls [`ManualScheduler::advance`].
#[derive(Clone, Default)]
pub(crate) struct ManualScheduler {
    clock: Rc<RefCell<ManualClock>>,
}

impl ManualScheduler {
    /// Move time forward, returning every expiry that became due, earliest first.
    pub fn advance(&self, by: Duration) -> Vec<(TimerId, TimerEvent)> {
        let mut clock = self.clock.borrow_mut();
        clock.now += by;
        let now = clock.now;

        let mut due: Vec<_> = Vec::new();
        clock.pending.retain(|entry| {
            if entry.0 <= now {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, id, _)| (*at, id.0));
        due.into_iter().map(|(_, id, event)| (id, event)).collect()
    }

    /// Same as [`advance`](Self::advance), shaped as session input.
    pub fn advance_events(&self, by: Duration) -> Vec<SessionEvent> {
        self.advance(by)
            .into_iter()
            .map(|(id, event)| SessionEvent::Timer { id, event })
            .collect()
    }

    /// Pending expiries as (time remaining, event).
    pub fn pending(&self) -> Vec<(Duration, TimerEvent)> {
        let clock = self.clock.borrow();
        let mut pending: Vec<_> = clock
            .pending
            .iter()
            .map(|(at, _, event)| (*at - clock.now, *event))
            .collect();
        pending.sort_by_key(|(at, _)| *at);
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.clock.borrow().pending.len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, after: Duration, event: TimerEvent) -> TimerId {
        let mut clock = self.clock.borrow_mut();
        let id = TimerId(clock.next_id);
        clock.next_id += 1;
        let at = clock.now + after;
        clock.pending.push((at, id, event));
        id
    }

    fn cancel(&self, id: TimerId) {
        self.clock
            .borrow_mut()
            .pending
            .retain(|(_, pending, _)| *pending != id);
    }
}

// --- Transport ---

#[derive(Default)]
struct FakeWire {
    sinks: Vec<TransportSink>,
    urls: Vec<Url>,
    closed: Vec<u64>,
    refuse: bool,
}

/// Records every connection the manager opens and closes.
#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    wire: Rc<RefCell<FakeWire>>,
}

impl FakeTransport {
    pub fn refuse_to_build(&self) {
        self.wire.borrow_mut().refuse = true;
    }

    pub fn open_count(&self) -> usize {
        self.wire.borrow().sinks.len()
    }

    pub fn closed_count(&self) -> usize {
        self.wire.borrow().closed.len()
    }

    pub fn last_sink(&self) -> TransportSink {
        self.wire
            .borrow()
            .sinks
            .last()
            .cloned()
            .expect("no connection opened")
    }

    pub fn last_url(&self) -> Url {
        self.wire
            .borrow()
            .urls
            .last()
            .cloned()
            .expect("no connection opened")
    }
}

struct FakeHandle {
    generation: u64,
    wire: Rc<RefCell<FakeWire>>,
}

impl TransportHandle for FakeHandle {
    fn close(&mut self) {
        self.wire.borrow_mut().closed.push(self.generation);
    }
}

impl PushTransport for FakeTransport {
    fn open(
        &mut self,
        url: &Url,
        sink: TransportSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let mut wire = self.wire.borrow_mut();
        if wire.refuse {
            return Err(TransportError::Connect("refused by test".to_string()));
        }
        let generation = sink.generation();
        wire.sinks.push(sink);
        wire.urls.push(url.clone());
        Ok(Box::new(FakeHandle {
            generation,
            wire: self.wire.clone(),
        }))
    }
}

// --- REST ---

/// Scripted notification API.
#[derive(Default)]
pub(crate) struct FakeApi {
    pages: RefCell<VecDeque<Result<NotificationPage, ApiError>>>,
    counts: RefCell<VecDeque<Result<u64, ApiError>>>,
    pub fail_marks: Cell<bool>,
    /// Page and count fetches never complete.
    pub hang: Cell<bool>,
    pub marked: RefCell<Vec<String>>,
    pub marked_all: Cell<usize>,
    pub list_calls: Cell<usize>,
}

impl FakeApi {
    /// Queue the answer for the next page + unread-count fetch.
    pub fn respond(&self, items: Vec<Notification>, unread: u64) {
        let page = NotificationPage {
            total: items.len() as u64,
            data: items,
            page: 1,
            limit: 20,
        };
        self.pages.borrow_mut().push_back(Ok(page));
        self.counts.borrow_mut().push_back(Ok(unread));
    }

    /// Fail the next page fetch. Only the page queue is touched: the fetch
    /// gives up on the first error, so the count request is never made.
    pub fn respond_error(&self) {
        self.pages
            .borrow_mut()
            .push_back(Err(ApiError::Network("connection refused".to_string())));
    }
}

fn unscripted<T>() -> Result<T, ApiError> {
    Err(ApiError::Network("no scripted response".to_string()))
}

#[async_trait(?Send)]
impl NotificationApi for FakeApi {
    async fn list(&self, _page: u32, _limit: u32) -> Result<NotificationPage, ApiError> {
        self.list_calls.set(self.list_calls.get() + 1);
        if self.hang.get() {
            std::future::pending::<()>().await;
        }
        self.pages.borrow_mut().pop_front().unwrap_or_else(unscripted)
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        if self.hang.get() {
            std::future::pending::<()>().await;
        }
        self.counts.borrow_mut().pop_front().unwrap_or_else(unscripted)
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        self.marked.borrow_mut().push(id.to_string());
        if self.fail_marks.get() {
            return Err(ApiError::Http {
                status: 500,
                body: String::new(),
            });
        }
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.marked_all.set(self.marked_all.get() + 1);
        if self.fail_marks.get() {
            return Err(ApiError::Http {
                status: 500,
                body: String::new(),
            });
        }
        Ok(())
    }
}
