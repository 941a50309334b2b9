//! Push delivery for the notification feed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ConnectionManager              │
//! │   (state machine, backoff, polling handoff)  │
//! └──────────────────────────────────────────────┘
//!                        │ open / close
//!                        ▼
//!              ┌───────────────────┐
//!              │   PushTransport   │
//!              │ (WebSocket, fake) │
//!              └───────────────────┘
//!                        │ TransportEvent, stamped with a generation
//!                        ▼
//!              ┌───────────────────┐
//!              │   session events  │──▶ NotificationFeed
//!              └───────────────────┘
//! ```
//!
//! The manager never touches the feed. It hands back a [`ConnectionAction`]
//! and the session applies it.

mod connection;
mod manager;

pub use connection::{
    ConnectionPhase, ConnectionState, PushTransport, TransportError, TransportEvent,
    TransportHandle, TransportSink, WebSocketTransport,
};
pub use manager::{ConnectionAction, ConnectionManager};
