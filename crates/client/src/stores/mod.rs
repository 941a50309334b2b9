//! Client-side state.

pub mod notifications;

pub use notifications::{FeedSnapshot, NotificationFeed, NotificationStore};
