//! Errors from workspace API calls.

use std::fmt;

use thiserror::Error;

const BODY_PREVIEW_LIMIT: usize = 512;

/// Coarse classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceErrorKind {
    /// Connection, timeout or other transport failure.
    Network,
    /// Non-success HTTP status.
    Status,
    /// Success status but the body was not what we expected.
    Decode,
}

impl fmt::Display for WorkspaceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Status => write!(f, "status"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{kind} error from {endpoint}{}: {message}", status_suffix(.status))]
pub struct WorkspaceError {
    pub kind: WorkspaceErrorKind,
    pub status: Option<u16>,
    pub endpoint: String,
    pub message: String,
}

impl WorkspaceError {
    pub fn network(endpoint: impl Into<String>, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("Request timeout: {}", err)
        } else if err.is_connect() {
            format!("Connection failed: {}", err)
        } else {
            format!("Request failed: {}", err)
        };
        Self {
            kind: WorkspaceErrorKind::Network,
            status: None,
            endpoint: endpoint.into(),
            message,
        }
    }

    pub fn status(endpoint: impl Into<String>, status: u16, body: &str) -> Self {
        Self {
            kind: WorkspaceErrorKind::Status,
            status: Some(status),
            endpoint: endpoint.into(),
            message: preview_body(body),
        }
    }

    pub fn decode(endpoint: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: WorkspaceErrorKind::Decode,
            status: Some(status),
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

pub(crate) fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    if trimmed.len() <= BODY_PREVIEW_LIMIT {
        return trimmed.to_string();
    }
    let mut end = BODY_PREVIEW_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_body_empty() {
        assert_eq!(preview_body("  \n"), "<empty body>");
    }

    #[test]
    fn test_preview_body_truncates_on_char_boundary() {
        let body = "é".repeat(BODY_PREVIEW_LIMIT);
        let preview = preview_body(&body);
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= BODY_PREVIEW_LIMIT + 3);
    }

    #[test]
    fn test_display_includes_status() {
        let err = WorkspaceError::status("POST /list/1/task", 401, r#"{"err":"Token invalid"}"#);
        let msg = err.to_string();
        assert!(msg.starts_with("status error from POST /list/1/task (HTTP 401)"));
        assert!(msg.contains("Token invalid"));
    }
}
