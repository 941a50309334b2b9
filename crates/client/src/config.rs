//! Client configuration from environment variables.

use std::time::Duration;

use url::Url;

use crate::backoff::ReconnectConfig;

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_STREAM_PATH: &str = "/notifications/stream";
const DEFAULT_PAGE_SIZE: u32 = 20;

/// Interval between polling fallback ticks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported URL scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),
    #[error("invalid value for {name}: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Everything a notification session needs to know about its environment.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// REST base URL, e.g. `https://dashboard.example.com/api`.
    pub api_base_url: String,
    /// Path of the push stream relative to the base URL.
    pub stream_path: String,
    /// Size of the first page fetched on initialize and on every poll.
    pub page_size: u32,
    pub poll_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: POLL_INTERVAL,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl NotifierConfig {
    /// Read configuration from the environment.
    ///
    /// Environment variables:
    /// - `NOTIFIER_API_URL`: REST base URL (default: "http://localhost:3000/api")
    /// - `NOTIFIER_STREAM_PATH`: push stream path (default: "/notifications/stream")
    /// - `NOTIFIER_PAGE_SIZE`: notifications per fetch (default: 20)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base_url =
            std::env::var("NOTIFIER_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let stream_path = std::env::var("NOTIFIER_STREAM_PATH")
            .unwrap_or_else(|_| DEFAULT_STREAM_PATH.to_string());

        let page_size = match std::env::var("NOTIFIER_PAGE_SIZE") {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: "NOTIFIER_PAGE_SIZE",
                        value: raw,
                    })
                }
            },
            Err(_) => DEFAULT_PAGE_SIZE,
        };

        let config = Self {
            api_base_url,
            stream_path,
            page_size,
            ..Self::default()
        };
        // Fail at startup rather than on the first connect.
        config.stream_endpoint()?;
        Ok(config)
    }

    /// Push stream URL without the credential: the API base with `http(s)`
    /// swapped for `ws(s)` and the stream path appended.
    pub fn stream_endpoint(&self) -> Result<Url, ConfigError> {
        let joined = format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.stream_path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|source| ConfigError::InvalidUrl {
            url: joined.clone(),
            source,
        })?;

        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::UnsupportedScheme(url.scheme().to_string()))?;
        Ok(url)
    }
}

/// Attach the session credential to a stream endpoint.
pub fn stream_url_with_token(endpoint: &Url, token: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair(notifier_shared::STREAM_TOKEN_PARAM, token);
    url
}

/// Render a stream URL for logs: everything except the query, which holds the token.
pub fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
