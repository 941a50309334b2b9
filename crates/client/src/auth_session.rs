//! The locally persisted credential a notification session runs under.

use serde::{Deserialize, Serialize};

use crate::storage::Storage;

const STORAGE_KEY: &str = "auth_session";

/// Identity handed over by the authentication subsystem.
///
/// `token` is used both as the REST bearer token and as the stream's query token.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub user_id: String,
    pub token: String,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl AuthSession {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }

    /// A session can only open a stream with both an identity and a credential.
    pub fn is_usable(&self) -> bool {
        !self.user_id.trim().is_empty() && !self.token.trim().is_empty()
    }

    pub fn load(storage: &Storage) -> Option<Self> {
        storage.load(STORAGE_KEY)
    }

    pub fn save(&self, storage: &Storage) -> bool {
        storage.save(STORAGE_KEY, self)
    }

    /// Forget the stored credential (on logout).
    pub fn clear(storage: &Storage) {
        storage.remove(STORAGE_KEY);
    }
}
