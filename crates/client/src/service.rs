//! Notification service facade: the only code that talks to the notification
//! REST endpoints, and so the only code that changes read state on the server.

use async_trait::async_trait;
use notifier_shared::{ApiError, NotificationPage, UnreadCount};
use reqwest::Method;

use crate::api_client::ApiClient;

/// The four REST operations the notification feed depends on.
#[async_trait(?Send)]
pub trait NotificationApi {
    /// `GET /notifications?page=&limit=`
    async fn list(&self, page: u32, limit: u32) -> Result<NotificationPage, ApiError>;

    /// `GET /notifications/unread-count`
    async fn unread_count(&self) -> Result<u64, ApiError>;

    /// `PUT /notifications/{id}/read`
    async fn mark_read(&self, id: &str) -> Result<(), ApiError>;

    /// `POST /notifications/mark-all-read`
    async fn mark_all_read(&self) -> Result<(), ApiError>;
}

/// [`NotificationApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct NotificationService {
    client: ApiClient,
}

impl NotificationService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait(?Send)]
impl NotificationApi for NotificationService {
    async fn list(&self, page: u32, limit: u32) -> Result<NotificationPage, ApiError> {
        self.client
            .get_json(&format!("/notifications?page={}&limit={}", page, limit))
            .await
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        let count: UnreadCount = self.client.get_json("/notifications/unread-count").await?;
        Ok(count.get())
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/notifications/{}/read", urlencoding::encode(id));
        self.client.send_empty(Method::PUT, &path).await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.client
            .send_empty(Method::POST, "/notifications/mark-all-read")
            .await
    }
}
