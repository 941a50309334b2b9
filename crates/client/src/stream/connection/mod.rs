//! Push transport capability and the connection state it drives.
//!
//! A transport only knows how to open one connection and report what happens
//! to it through a [`TransportSink`]. All decisions (retry, backoff, fallback)
//! belong to the [`ConnectionManager`](super::ConnectionManager).

use url::Url;

use crate::session::{EventSender, SessionEvent};

mod websocket;

pub use websocket::WebSocketTransport;

/// Phase of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Polling,
    Closed,
}

impl ConnectionPhase {
    /// Short status text for the UI. Never blocking: transport trouble is
    /// reported, not raised.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Open => "live",
            ConnectionPhase::Reconnecting => "reconnecting",
            ConnectionPhase::Polling => "using polling",
            ConnectionPhase::Closed => "closed",
        }
    }
}

/// Connection state owned by a single manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub attempt: u32,
    pub last_error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            attempt: 0,
            last_error: None,
        }
    }
}

/// Something that happened to an open transport handle.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection established.
    Opened,
    /// One text frame.
    Message(String),
    Error(String),
    /// The remote side went away without us asking.
    Closed(Option<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported stream scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("cannot start connection: {0}")]
    Connect(String),
}

/// Where a transport reports events for one connection.
///
/// Each sink is stamped with the generation of the connection it belongs to,
/// so the manager can tell a live handle from one it already discarded.
#[derive(Clone)]
pub struct TransportSink {
    generation: u64,
    events: EventSender,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, events: EventSender) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()));
    }

    pub fn error(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Error(reason.into()));
    }

    pub fn closed(&self, reason: Option<String>) {
        self.emit(TransportEvent::Closed(reason));
    }

    fn emit(&self, event: TransportEvent) {
        // Session gone: nobody left to tell.
        let _ = self.events.unbounded_send(SessionEvent::Transport {
            generation: self.generation,
            event,
        });
    }
}

/// A live connection that can be closed.
pub trait TransportHandle {
    fn close(&mut self);
}

/// Push transport capability.
pub trait PushTransport {
    /// Begin connecting to `url`. Returns immediately; the outcome is reported
    /// through `sink`. An `Err` means the transport cannot be built at all.
    fn open(
        &mut self,
        url: &Url,
        sink: TransportSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError>;
}
