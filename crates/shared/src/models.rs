//! Notification data model as exchanged with the dashboard API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Notifications ---

/// Category of a notification. Only affects presentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    Credit,
    Commission,
    RankChange,
    WithdrawalApproved,
    WithdrawalRejected,
    System,
    /// A category this client does not know about yet.
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::Credit => "credit",
            NotificationType::Commission => "commission",
            NotificationType::RankChange => "rank_change",
            NotificationType::WithdrawalApproved => "withdrawal_approved",
            NotificationType::WithdrawalRejected => "withdrawal_rejected",
            NotificationType::System => "system",
            NotificationType::Other(s) => s,
        }
    }
}

impl From<String> for NotificationType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "credit" => NotificationType::Credit,
            "commission" => NotificationType::Commission,
            "rank_change" => NotificationType::RankChange,
            "withdrawal_approved" => NotificationType::WithdrawalApproved,
            "withdrawal_rejected" => NotificationType::WithdrawalRejected,
            "system" => NotificationType::System,
            _ => NotificationType::Other(value),
        }
    }
}

impl From<NotificationType> for String {
    fn from(value: NotificationType) -> Self {
        match value {
            NotificationType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// A single notification, identical whether it came from a REST fetch or the push stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    /// Human readable age of the notification relative to `now`.
    pub fn relative_time(&self, now: DateTime<Utc>) -> String {
        let elapsed = now.signed_duration_since(self.created_at);
        let minutes = elapsed.num_minutes();
        if minutes < 1 {
            return "just now".to_string();
        }
        if minutes < 60 {
            return plural(minutes, "minute");
        }
        let hours = elapsed.num_hours();
        if hours < 24 {
            return plural(hours, "hour");
        }
        let days = elapsed.num_days();
        if days <= 30 {
            return plural(days, "day");
        }
        self.created_at.format("%Y-%m-%d").to_string()
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// One page of `GET /notifications`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    #[serde(alias = "notifications", alias = "items")]
    pub data: Vec<Notification>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

/// Body of `GET /notifications/unread-count`. Servers answer either `3` or `{"count": 3}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum UnreadCount {
    Bare(u64),
    Wrapped { count: u64 },
}

impl UnreadCount {
    pub fn get(self) -> u64 {
        match self {
            UnreadCount::Bare(n) | UnreadCount::Wrapped { count: n } => n,
        }
    }
}
