//! One authenticated notification session.
//!
//! The session owns the connection manager, the polling fallback and the
//! store. Everything asynchronous reaches it as a [`SessionEvent`] on one
//! channel and is handled to completion before the next event is read:
//!
//! ```text
//!  transport task ──┐
//!  timer task ──────┼──▶ SessionEvent channel ──▶ NotificationSession::dispatch
//!  SessionHandle ───┘                                 │
//!                                  ┌──────────────────┼───────────────────┐
//!                                  ▼                  ▼                   ▼
//!                          ConnectionManager   PollingFallback    NotificationFeed
//! ```
//!
//! The one exception is shutdown: a [`SessionHandle::shutdown`] request drops
//! an initial fetch or poll tick that is still waiting on the network.
//!
//! A new login builds a new session; nothing is reused across sessions.

use std::future::Future;
use std::rc::Rc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use notifier_shared::ApiError;
use tokio::sync::watch;

use crate::auth_session::AuthSession;
use crate::config::NotifierConfig;
use crate::polling::PollingFallback;
use crate::service::NotificationApi;
use crate::stores::{FeedSnapshot, NotificationFeed};
use crate::stream::{
    ConnectionAction, ConnectionManager, ConnectionPhase, ConnectionState, PushTransport,
    TransportEvent,
};
use crate::timer::{Scheduler, TimerEvent, TimerId};

/// Input to a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Reported by the transport handle of connection `generation`.
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    /// A scheduled timer expired.
    Timer { id: TimerId, event: TimerEvent },
    /// End the session.
    Shutdown,
}

pub type EventSender = UnboundedSender<SessionEvent>;

/// The channel a session reads from. Create it first so schedulers and
/// transports can be handed a sender before the session exists.
pub struct EventChannel {
    sender: EventSender,
    receiver: UnboundedReceiver<SessionEvent>,
}

impl EventChannel {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NotificationSession {
    identity: Option<AuthSession>,
    feed: NotificationFeed,
    connection: ConnectionManager,
    polling: PollingFallback,
    events: UnboundedReceiver<SessionEvent>,
    sender: EventSender,
    /// Raised by [`SessionHandle::shutdown`] so fetches in flight are abandoned
    /// without waiting for the queued `Shutdown` event.
    stop: Rc<watch::Sender<bool>>,
    stopped: watch::Receiver<bool>,
    closed: bool,
}

impl NotificationSession {
    pub fn new(
        config: &NotifierConfig,
        identity: Option<AuthSession>,
        api: Rc<dyn NotificationApi>,
        transport: Box<dyn PushTransport>,
        scheduler: Rc<dyn Scheduler>,
        channel: EventChannel,
    ) -> Self {
        let endpoint = match config.stream_endpoint() {
            Ok(url) => Some(url),
            Err(e) => {
                crate::log_error!("Cannot build notification stream URL: {}", e);
                None
            }
        };

        let EventChannel { sender, receiver } = channel;
        let (stop, stopped) = watch::channel(false);
        Self {
            identity,
            feed: NotificationFeed::new(api, config.page_size),
            connection: ConnectionManager::new(
                endpoint,
                config.reconnect.clone(),
                transport,
                scheduler.clone(),
                sender.clone(),
            ),
            polling: PollingFallback::new(scheduler, config.poll_interval),
            events: receiver,
            sender,
            stop: Rc::new(stop),
            stopped,
            closed: false,
        }
    }

    /// Handle for consumers. Stays valid after the session ends, but the
    /// feed it reads stops changing.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            feed: self.feed.clone(),
            status: self.connection.subscribe(),
            events: self.sender.clone(),
            stop: self.stop.clone(),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.connection.phase()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Initial fetch, then open the push stream. Without a usable identity
    /// nothing happens and the connection stays `Idle`.
    pub async fn start(&mut self) {
        if self.closed {
            return;
        }
        if !self.identity.as_ref().is_some_and(|s| s.is_usable()) {
            crate::log_info!("Notification session has no authenticated user");
            return;
        }

        // Fail-soft: a failed first fetch leaves an empty, unloaded feed.
        let mut stopped = self.stopped.clone();
        if until_stopped(&mut stopped, self.feed.initialize())
            .await
            .is_none()
        {
            self.shutdown();
            return;
        }

        let action = self.connection.start(self.identity.as_ref());
        self.apply(action);
    }

    /// Handle one event to completion.
    pub async fn dispatch(&mut self, event: SessionEvent) {
        if self.closed {
            crate::log_debug!("Session closed; dropping {:?}", event);
            return;
        }

        match event {
            SessionEvent::Transport { generation, event } => {
                let action = self.connection.on_transport(generation, event);
                self.apply(action);
            }
            SessionEvent::Timer {
                id,
                event: TimerEvent::Reconnect,
            } => {
                let action = self.connection.on_timer(id, TimerEvent::Reconnect);
                self.apply(action);
            }
            SessionEvent::Timer {
                id,
                event: TimerEvent::Poll,
            } => {
                let mut stopped = self.stopped.clone();
                if until_stopped(&mut stopped, self.polling.tick(id, &self.feed))
                    .await
                    .is_none()
                {
                    self.shutdown();
                }
            }
            SessionEvent::Shutdown => self.shutdown(),
        }
    }

    /// Start, then process events until shut down.
    pub async fn run(mut self) {
        self.start().await;
        while !self.closed {
            match self.events.next().await {
                Some(event) => self.dispatch(event).await,
                None => break,
            }
        }
        self.shutdown();
    }

    /// Close the stream, cancel the backoff timer and stop polling.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stop.send_replace(true);
        self.connection.close();
        self.polling.stop();
        self.feed.close();
        crate::log_info!("Notification session ended");
    }

    fn apply(&mut self, action: ConnectionAction) {
        match action {
            ConnectionAction::None => {}
            ConnectionAction::Ingest(notification) => {
                self.feed.ingest(notification);
            }
            ConnectionAction::StartPolling => self.polling.start(),
        }
    }
}

/// Drive `work` to completion unless shutdown is requested first, in which
/// case the work is dropped mid-flight and `None` returned.
async fn until_stopped<F: Future>(
    stopped: &mut watch::Receiver<bool>,
    work: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = stopped.wait_for(|stop| *stop) => None,
        output = work => Some(output),
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// What the UI holds on to: read the feed, act on it, end the session.
#[derive(Clone)]
pub struct SessionHandle {
    feed: NotificationFeed,
    status: watch::Receiver<ConnectionState>,
    events: EventSender,
    stop: Rc<watch::Sender<bool>>,
}

impl SessionHandle {
    pub fn snapshot(&self) -> FeedSnapshot {
        self.feed.snapshot()
    }

    /// New snapshot after every change to the feed.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.feed.subscribe()
    }

    /// Connection state changes, for a "reconnecting" / "using polling" indicator.
    pub fn connection_status(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    pub fn mark_as_read(&self, id: &str) -> impl Future<Output = ()> + 'static {
        self.feed.mark_as_read(id)
    }

    pub fn mark_all_as_read(&self) -> impl Future<Output = ()> + 'static {
        self.feed.mark_all_as_read()
    }

    /// Re-fetch the first page and unread count, replacing the feed.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.feed.initialize().await
    }

    /// End the session. A fetch the session is waiting on is abandoned.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
        let _ = self.events.unbounded_send(SessionEvent::Shutdown);
    }
}
