//! Notification store: the single source of truth for the notification feed.
//!
//! [`NotificationStore`] holds the ordered sequence (newest first, unique ids)
//! and the unread counter. [`NotificationFeed`] pairs it with the service
//! facade to provide the user-facing operations. Consumers only ever see
//! [`FeedSnapshot`] copies.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::try_join;
use notifier_shared::{ApiError, Notification, NotificationPage};
use tokio::sync::watch;

use crate::service::NotificationApi;

/// Read-only copy of the feed for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    /// Whether an initial fetch has succeeded.
    pub loaded: bool,
}

/// In-memory notification sequence plus unread counter.
///
/// The counter starts out as whatever the server reported and is then
/// adjusted by local mutations; it is not recomputed from the sequence,
/// because the server counts notifications beyond the first page.
#[derive(Debug, Default)]
pub struct NotificationStore {
    notifications: Vec<Notification>,
    unread_count: u64,
    loaded: bool,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a fresh fetch.
    pub fn replace(&mut self, notifications: Vec<Notification>, unread_count: u64) {
        let mut seen = HashSet::new();
        self.notifications = notifications
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .collect();
        self.unread_count = unread_count;
        self.loaded = true;
    }

    /// Prepend a notification unless its id is already known.
    /// Returns false for a duplicate delivery.
    pub fn ingest(&mut self, notification: Notification) -> bool {
        if self.contains(&notification.id) {
            return false;
        }
        if !notification.read {
            self.unread_count += 1;
        }
        self.notifications.insert(0, notification);
        true
    }

    /// Mark one entry read. Returns true if it was unread and present.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for n in self.notifications.iter_mut() {
            n.read = true;
        }
        self.unread_count = 0;
    }

    /// Server-reported unread count, taken as ground truth.
    pub fn set_unread_count(&mut self, unread_count: u64) {
        self.unread_count = unread_count;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.notifications.iter().any(|n| n.id == id)
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            notifications: self.notifications.clone(),
            unread_count: self.unread_count,
            loaded: self.loaded,
        }
    }
}

/// The notification store as the rest of the session uses it.
///
/// Cheap to clone; all clones share one store. Store borrows never span an
/// `.await`, so interleaved tasks on the session's thread always observe a
/// consistent store.
#[derive(Clone)]
pub struct NotificationFeed {
    store: Rc<RefCell<NotificationStore>>,
    api: Rc<dyn NotificationApi>,
    page_size: u32,
    changes: Rc<watch::Sender<FeedSnapshot>>,
    closed: Rc<Cell<bool>>,
}

impl NotificationFeed {
    pub fn new(api: Rc<dyn NotificationApi>, page_size: u32) -> Self {
        let (changes, _) = watch::channel(FeedSnapshot::default());
        Self {
            store: Rc::new(RefCell::new(NotificationStore::new())),
            api,
            page_size,
            changes: Rc::new(changes),
            closed: Rc::new(Cell::new(false)),
        }
    }

    /// Stop accepting fetched or delivered data. Requests still in flight when
    /// the session ends finish without touching the store.
    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Fetch the first page and unread count and replace the store with them.
    /// On failure the store keeps what it had.
    pub async fn initialize(&self) -> Result<(), ApiError> {
        match self.fetch_first_page().await {
            Ok(_) if self.is_closed() => {
                crate::log_debug!("Discarding notification fetch that finished after close");
                Ok(())
            }
            Ok((page, unread)) => {
                crate::log_info!(
                    "Loaded {} notifications ({} unread)",
                    page.data.len(),
                    unread
                );
                self.store.borrow_mut().replace(page.data, unread);
                self.publish();
                Ok(())
            }
            Err(e) => {
                crate::log_error!("Failed to load notifications: {}", e.detail());
                Err(e)
            }
        }
    }

    /// Add a pushed notification. Duplicates are ignored.
    pub fn ingest(&self, notification: Notification) -> bool {
        if self.is_closed() {
            return false;
        }
        let id = notification.id.clone();
        let inserted = self.store.borrow_mut().ingest(notification);
        if inserted {
            self.publish();
        } else {
            crate::log_debug!("Duplicate delivery of notification {}", id);
        }
        inserted
    }

    /// Fetch what the polling fallback needs and feed it through [`ingest`](Self::ingest).
    pub(crate) async fn poll(&self) -> Result<(), ApiError> {
        let (page, unread) = self.fetch_first_page().await?;
        if self.is_closed() {
            return Ok(());
        }
        let mut fresh = 0;
        {
            let mut store = self.store.borrow_mut();
            // Oldest first, so the newest ends up at the front.
            for notification in page.data.into_iter().rev() {
                if store.ingest(notification) {
                    fresh += 1;
                }
            }
            store.set_unread_count(unread);
        }
        crate::log_debug!("Poll brought {} new notifications, {} unread", fresh, unread);
        self.publish();
        Ok(())
    }

    /// Mark one notification read locally, right now. The returned future
    /// tells the server; if that fails the local change stands.
    pub fn mark_as_read(&self, id: &str) -> impl Future<Output = ()> + 'static {
        if self.store.borrow_mut().mark_read(id) {
            self.publish();
        }
        let api = self.api.clone();
        let id = id.to_string();
        async move {
            if let Err(e) = api.mark_read(&id).await {
                crate::log_warn!(
                    "Server did not record notification {} as read: {}",
                    id,
                    e.detail()
                );
            }
        }
    }

    /// Mark everything read locally, right now. Same no-rollback policy as
    /// [`mark_as_read`](Self::mark_as_read).
    pub fn mark_all_as_read(&self) -> impl Future<Output = ()> + 'static {
        self.store.borrow_mut().mark_all_read();
        self.publish();
        let api = self.api.clone();
        async move {
            if let Err(e) = api.mark_all_read().await {
                crate::log_warn!(
                    "Server did not record mark-all-read: {}",
                    e.detail()
                );
            }
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.store.borrow().snapshot()
    }

    /// Receive a new snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.changes.subscribe()
    }

    async fn fetch_first_page(&self) -> Result<(NotificationPage, u64), ApiError> {
        try_join(self.api.list(1, self.page_size), self.api.unread_count()).await
    }

    fn publish(&self) {
        let snapshot = self.store.borrow().snapshot();
        self.changes.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{notification, FakeApi};

    fn feed_with(api: &Rc<FakeApi>) -> NotificationFeed {
        NotificationFeed::new(api.clone(), 20)
    }

    #[test]
    fn test_ingest_prepends_and_dedupes() {
        let mut store = NotificationStore::new();
        store.replace(vec![notification("a", false)], 1);

        assert!(store.ingest(notification("b", false)));
        assert!(!store.ingest(notification("b", false)));
        assert!(!store.ingest(notification("a", true)));

        let snapshot = store.snapshot();
        let ids: Vec<_> = snapshot.notifications.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(snapshot.unread_count, 2);
    }

    #[test]
    fn test_ingest_read_notification_keeps_counter() {
        let mut store = NotificationStore::new();
        assert!(store.ingest(notification("a", true)));
        assert_eq!(store.unread_count(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_arrival_order_not_creation_order() {
        let mut store = NotificationStore::new();
        let mut older = notification("older", false);
        older.created_at -= chrono::Duration::days(3);

        store.ingest(notification("newer", false));
        store.ingest(older);

        assert_eq!(store.snapshot().notifications[0].id, "older");
    }

    #[test]
    fn test_mark_read_never_goes_negative() {
        let mut store = NotificationStore::new();
        store.replace(vec![notification("a", false), notification("b", false)], 2);

        assert!(store.mark_read("a"));
        assert_eq!(store.unread_count(), 1);
        assert!(!store.mark_read("a"));
        assert_eq!(store.unread_count(), 1);
        assert!(!store.mark_read("missing"));
        assert_eq!(store.unread_count(), 1);

        // Counter already disagreeing with the sequence still floors at zero.
        store.set_unread_count(0);
        assert!(store.mark_read("b"));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_mark_all_read() {
        let mut store = NotificationStore::new();
        store.replace(
            vec![notification("a", false), notification("b", true), notification("c", false)],
            7,
        );

        store.mark_all_read();

        assert_eq!(store.unread_count(), 0);
        assert!(store.snapshot().notifications.iter().all(|n| n.read));
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut store = NotificationStore::new();
        store.replace(vec![notification("a", false)], 1);
        store.ingest(notification("pushed", false));

        store.replace(vec![notification("x", true), notification("x", true)], 0);

        assert_eq!(store.len(), 1);
        assert!(!store.contains("pushed"));
        assert_eq!(store.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_initialize_replaces_store() {
        let api = Rc::new(FakeApi::default());
        api.respond(vec![notification("a", false), notification("b", true)], 5);
        let feed = feed_with(&api);
        let mut changes = feed.subscribe();

        feed.initialize().await.unwrap();

        let snapshot = feed.snapshot();
        assert!(snapshot.loaded);
        assert_eq!(snapshot.notifications.len(), 2);
        assert_eq!(snapshot.unread_count, 5);
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), snapshot);
    }

    #[tokio::test]
    async fn test_failed_initialize_keeps_prior_state() {
        let api = Rc::new(FakeApi::default());
        api.respond(vec![notification("a", false)], 1);
        api.respond_error();
        let feed = feed_with(&api);

        feed.initialize().await.unwrap();
        feed.ingest(notification("b", false));
        let before = feed.snapshot();

        assert!(feed.initialize().await.is_err());
        assert_eq!(feed.snapshot(), before);
    }

    #[tokio::test]
    async fn test_fetch_after_failure_gets_its_own_count() {
        let api = Rc::new(FakeApi::default());
        api.respond_error();
        api.respond(vec![notification("a", false), notification("b", true)], 7);
        let feed = feed_with(&api);

        assert!(feed.initialize().await.is_err());
        feed.initialize().await.unwrap();

        let snapshot = feed.snapshot();
        assert_eq!(snapshot.notifications.len(), 2);
        assert_eq!(snapshot.unread_count, 7);
        assert!(snapshot.loaded);
    }

    #[tokio::test]
    async fn test_mark_as_read_is_optimistic_without_rollback() {
        let api = Rc::new(FakeApi::default());
        api.respond(vec![notification("a", false), notification("b", false)], 2);
        api.fail_marks.set(true);
        let feed = feed_with(&api);
        feed.initialize().await.unwrap();

        let pending = feed.mark_as_read("a");
        // Applied before the server has been asked.
        assert_eq!(feed.snapshot().unread_count, 1);
        assert!(api.marked.borrow().is_empty());

        pending.await;
        assert_eq!(*api.marked.borrow(), vec!["a".to_string()]);
        let snapshot = feed.snapshot();
        assert_eq!(snapshot.unread_count, 1);
        assert!(snapshot.notifications.iter().find(|n| n.id == "a").unwrap().read);

        feed.mark_as_read("a").await;
        assert_eq!(feed.snapshot().unread_count, 1);
    }

    #[tokio::test]
    async fn test_mark_all_as_read_is_optimistic_without_rollback() {
        let api = Rc::new(FakeApi::default());
        api.respond(vec![notification("a", false), notification("b", false)], 9);
        api.fail_marks.set(true);
        let feed = feed_with(&api);
        feed.initialize().await.unwrap();

        let pending = feed.mark_all_as_read();
        assert_eq!(feed.snapshot().unread_count, 0);
        pending.await;

        assert_eq!(api.marked_all.get(), 1);
        let snapshot = feed.snapshot();
        assert_eq!(snapshot.unread_count, 0);
        assert!(snapshot.notifications.iter().all(|n| n.read));
    }

    #[tokio::test]
    async fn test_closed_feed_ignores_late_data() {
        let api = Rc::new(FakeApi::default());
        api.respond(vec![notification("a", false)], 1);
        api.respond(vec![notification("a", false), notification("b", false)], 2);
        api.respond(vec![notification("c", false)], 1);
        let feed = feed_with(&api);
        feed.initialize().await.unwrap();
        let before = feed.snapshot();

        let in_flight = feed.initialize();
        feed.close();
        in_flight.await.unwrap();

        assert!(!feed.ingest(notification("late", false)));
        feed.poll().await.unwrap();
        assert_eq!(feed.snapshot(), before);
    }

    #[tokio::test]
    async fn test_poll_merges_without_duplicates() {
        let api = Rc::new(FakeApi::default());
        api.respond(vec![notification("a", false)], 1);
        api.respond(
            vec![notification("c", false), notification("b", false), notification("a", false)],
            3,
        );
        let feed = feed_with(&api);
        feed.initialize().await.unwrap();

        feed.poll().await.unwrap();

        let snapshot = feed.snapshot();
        let ids: Vec<_> = snapshot.notifications.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(snapshot.unread_count, 3);
    }
}
