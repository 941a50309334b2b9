//! Notifier Client - real-time notification delivery
//!
//! Keeps a user's notification feed and unread count current for the
//! lifetime of an authenticated session: an initial REST fetch, then push
//! delivery over a WebSocket, degrading to periodic polling when the push
//! channel cannot be kept up.

#[macro_use]
pub mod logging;

pub mod api_client;
pub mod auth_session;
pub mod backoff;
pub mod config;
pub mod polling;
pub mod service;
pub mod session;
pub mod storage;
pub mod stores;
pub mod stream;
pub mod timer;

#[cfg(test)]
mod testing;

pub use api_client::ApiClient;
pub use auth_session::AuthSession;
pub use config::NotifierConfig;
pub use service::{NotificationApi, NotificationService};
pub use session::{EventChannel, NotificationSession, SessionEvent, SessionHandle};
pub use storage::Storage;
pub use stores::{FeedSnapshot, NotificationFeed};
pub use stream::{ConnectionPhase, ConnectionState, WebSocketTransport};
pub use timer::TokioScheduler;
