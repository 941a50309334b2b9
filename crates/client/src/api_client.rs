//! HTTP API client with bearer-token authentication.

use std::time::Duration;

use notifier_shared::ApiError;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;

/// Upper bound on one request, response body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for JSON requests against the dashboard API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.send(Method::GET, path).await
    }

    /// Request without a body whose response is only an acknowledgment.
    pub async fn send_empty(&self, method: Method, path: &str) -> Result<(), ApiError> {
        self.send::<serde::de::IgnoredAny>(method, path)
            .await
            .map(|_| ())
    }

    async fn send<TRes: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
    ) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let mut rb = self.client.request(method, &url).timeout(self.timeout);

        if let Some(token) = &self.token {
            rb = rb.bearer_auth(token);
        }
        rb = rb.header("Accept", "application/json");

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        if text.trim().is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }
}
