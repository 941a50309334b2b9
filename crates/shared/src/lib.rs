//! Shared types for the notifier client and anything that speaks its wire format.

pub mod models;
pub mod protocol;
pub mod error;

pub use models::*;
pub use protocol::*;
pub use error::*;
