//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};

/// RFC7807 Problem Details (application/problem+json)
///
/// The dashboard API reports validation and auth failures in this shape. We only
/// ever decode it to pull out a readable message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type", default)]
    pub type_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.title.trim().is_empty() {
        return Some(parsed.title);
    }
    None
}

/// Failure of a REST call against the notification API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Short description suitable for a log line or status text.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Http { status, body } => match try_problem_detail(body) {
                Some(detail) => format!("HTTP {}: {}", status, detail),
                None => format!("HTTP {}", status),
            },
            other => other.to_string(),
        }
    }

    /// Whether the server rejected the credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Http { status: 401, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_prefers_problem_detail() {
        let err = ApiError::Http {
            status: 404,
            body: r#"{"type":"about:blank","title":"Not Found","status":404,"detail":"notification n1 does not exist"}"#
                .to_string(),
        };
        assert_eq!(err.detail(), "HTTP 404: notification n1 does not exist");
    }

    #[test]
    fn test_detail_with_plain_body() {
        let err = ApiError::Http {
            status: 502,
            body: "<html>bad gateway</html>".to_string(),
        };
        assert_eq!(err.detail(), "HTTP 502");
        assert!(!err.is_unauthorized());
        assert!(ApiError::Http { status: 401, body: String::new() }.is_unauthorized());
    }
}
