//! Push connection state machine for one session.

use std::rc::Rc;

use notifier_shared::{Notification, StreamMessage};
use tokio::sync::watch;
use url::Url;

use super::connection::{
    ConnectionPhase, ConnectionState, PushTransport, TransportEvent, TransportHandle,
    TransportSink,
};
use crate::auth_session::AuthSession;
use crate::backoff::ReconnectConfig;
use crate::config::{redact, stream_url_with_token};
use crate::session::EventSender;
use crate::timer::{Scheduler, TimerEvent, TimerId};

/// What the session should do after the manager handled an input.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    None,
    /// A notification arrived on the stream.
    Ingest(Notification),
    /// Push is gone for good; start the polling fallback.
    StartPolling,
}

/// Owns the session's push connection.
///
/// ```text
/// Idle ─start─▶ Connecting ─opened─▶ Open
///                  ▲    │              │
///           backoff│    └──error/close─┴─▶ Reconnecting ─attempt > max─▶ Polling
///                  └────────────────────────────┘
/// any ─close─▶ Closed
/// ```
pub struct ConnectionManager {
    state: ConnectionState,
    status: watch::Sender<ConnectionState>,
    reconnect: ReconnectConfig,
    endpoint: Option<Url>,
    stream_url: Option<Url>,
    transport: Box<dyn PushTransport>,
    scheduler: Rc<dyn Scheduler>,
    events: EventSender,
    handle: Option<Box<dyn TransportHandle>>,
    /// Bumped whenever a handle is opened or discarded; events stamped with
    /// an older generation belong to a dead handle.
    generation: u64,
    retry_timer: Option<TimerId>,
}

impl ConnectionManager {
    /// `endpoint` is the stream URL without credential; `None` when it could
    /// not be derived, which sends the session straight to polling.
    pub fn new(
        endpoint: Option<Url>,
        reconnect: ReconnectConfig,
        transport: Box<dyn PushTransport>,
        scheduler: Rc<dyn Scheduler>,
        events: EventSender,
    ) -> Self {
        let state = ConnectionState::default();
        let (status, _) = watch::channel(state.clone());
        Self {
            state,
            status,
            reconnect,
            endpoint,
            stream_url: None,
            transport,
            scheduler,
            events,
            handle: None,
            generation: 0,
            retry_timer: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.phase
    }

    /// Follow state transitions. Receivers get copies.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    /// Open the first connection. Without a usable identity the manager stays `Idle`.
    pub fn start(&mut self, identity: Option<&AuthSession>) -> ConnectionAction {
        if self.state.phase != ConnectionPhase::Idle {
            crate::log_debug!("start ignored in phase {:?}", self.state.phase);
            return ConnectionAction::None;
        }
        let Some(identity) = identity.filter(|s| s.is_usable()) else {
            crate::log_info!("No authenticated user; notification stream stays idle");
            return ConnectionAction::None;
        };
        let Some(endpoint) = self.endpoint.as_ref() else {
            self.state.last_error = Some("stream endpoint unavailable".to_string());
            return self.enter_polling();
        };

        self.stream_url = Some(stream_url_with_token(endpoint, &identity.token));
        crate::log_info!("Starting notification stream for {}", identity.user_id);
        self.connect()
    }

    /// Handle an event reported by a transport handle.
    pub fn on_transport(&mut self, generation: u64, event: TransportEvent) -> ConnectionAction {
        if self.state.phase == ConnectionPhase::Closed {
            crate::log_debug!("Ignoring transport event after close: {:?}", event);
            return ConnectionAction::None;
        }
        if generation != self.generation || self.handle.is_none() {
            crate::log_debug!(
                "Ignoring event from discarded connection {} (current {})",
                generation,
                self.generation
            );
            return ConnectionAction::None;
        }

        match event {
            TransportEvent::Opened => {
                if self.state.phase == ConnectionPhase::Connecting {
                    self.state.phase = ConnectionPhase::Open;
                    self.state.attempt = 0;
                    self.state.last_error = None;
                    self.publish();
                    crate::log_info!("Notification stream open");
                }
                ConnectionAction::None
            }
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Error(reason) => self.on_failure(reason),
            TransportEvent::Closed(reason) => self.on_failure(
                reason
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "connection closed by server".to_string()),
            ),
        }
    }

    /// Handle an expired timer. Only the pending backoff timer is acted on.
    pub fn on_timer(&mut self, id: TimerId, event: TimerEvent) -> ConnectionAction {
        if event != TimerEvent::Reconnect || self.retry_timer != Some(id) {
            return ConnectionAction::None;
        }
        self.retry_timer = None;
        if self.state.phase != ConnectionPhase::Reconnecting {
            return ConnectionAction::None;
        }
        self.connect()
    }

    /// Tear down for good: cancel the backoff timer, close the handle, enter `Closed`.
    pub fn close(&mut self) {
        if self.state.phase == ConnectionPhase::Closed {
            return;
        }
        self.cancel_retry();
        self.discard_handle();
        self.state.phase = ConnectionPhase::Closed;
        self.publish();
        crate::log_info!("Notification stream closed");
    }

    fn connect(&mut self) -> ConnectionAction {
        let Some(url) = self.stream_url.clone() else {
            return self.enter_polling();
        };

        self.discard_handle();
        self.state.phase = ConnectionPhase::Connecting;
        self.publish();
        crate::log_info!(
            "Connecting to {} (attempt {})",
            redact(&url),
            self.state.attempt
        );

        let sink = TransportSink::new(self.generation, self.events.clone());
        match self.transport.open(&url, sink) {
            Ok(handle) => {
                self.handle = Some(handle);
                ConnectionAction::None
            }
            Err(e) => {
                crate::log_warn!("Push transport unavailable: {}", e);
                self.state.last_error = Some(e.to_string());
                self.enter_polling()
            }
        }
    }

    fn on_message(&mut self, text: &str) -> ConnectionAction {
        match StreamMessage::parse(text) {
            Ok(StreamMessage::Notification(notification)) => {
                crate::log_debug!("Stream delivered notification {}", notification.id);
                ConnectionAction::Ingest(notification)
            }
            Ok(StreamMessage::Connected) => {
                crate::log_debug!("Stream acknowledged connection");
                ConnectionAction::None
            }
            Ok(StreamMessage::Unknown(kind)) => {
                crate::log_debug!("Ignoring stream message of type {:?}", kind);
                ConnectionAction::None
            }
            Err(e) => {
                crate::log_debug!("Dropping unparseable stream message: {}", e);
                ConnectionAction::None
            }
        }
    }

    fn on_failure(&mut self, reason: String) -> ConnectionAction {
        self.discard_handle();
        self.state.last_error = Some(reason);
        // Counted before the timer starts.
        self.state.attempt += 1;

        if self.state.attempt > self.reconnect.max_attempts {
            return self.enter_polling();
        }

        self.state.phase = ConnectionPhase::Reconnecting;
        self.publish();

        let delay = self.reconnect.delay_for_attempt(self.state.attempt - 1);
        crate::log_warn!(
            "Notification stream failed ({}); retry {} of {} in {}ms",
            self.state.last_error.as_deref().unwrap_or("unknown error"),
            self.state.attempt,
            self.reconnect.max_attempts,
            delay.as_millis()
        );
        self.cancel_retry();
        self.retry_timer = Some(self.scheduler.schedule(delay, TimerEvent::Reconnect));
        ConnectionAction::None
    }

    fn enter_polling(&mut self) -> ConnectionAction {
        self.cancel_retry();
        self.discard_handle();
        if self.state.phase == ConnectionPhase::Polling {
            return ConnectionAction::None;
        }
        self.state.phase = ConnectionPhase::Polling;
        self.publish();
        crate::log_warn!(
            "Push notifications unavailable ({}); falling back to polling",
            self.state.last_error.as_deref().unwrap_or("no stream")
        );
        ConnectionAction::StartPolling
    }

    fn discard_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
        self.generation += 1;
    }

    fn cancel_retry(&mut self) {
        if let Some(id) = self.retry_timer.take() {
            self.scheduler.cancel(id);
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.state.clone());
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}
