//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::task::Task;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Only used in multi-user mode.
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// Expiry as unix seconds.
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dev_mode: bool,
    pub auth_required: bool,
    /// "disabled", "single_tenant" or "multi_user"
    pub auth_mode: String,
    pub billing_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub username: String,
    pub clickup_connected: bool,
    pub plan: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlResponse {
    pub url: String,
}

/// Result of `POST /api/documents/extract`: the text and the proposed tasks
/// for the user to review before materializing.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractResponse {
    pub text: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeRequest {
    #[serde(default)]
    pub list_id: String,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub document_text: Option<String>,
    /// A `.docx` as a base64 data URI, used when no text is given.
    #[serde(default)]
    pub document_data_uri: Option<String>,
    /// Reviewed tasks; take precedence over any document.
    #[serde(default)]
    pub tasks: Option<Vec<Task>>,
}

/// The two-state envelope returned by `POST /api/materialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MaterializeResponse {
    Success { message: String },
    Error { error: String },
}

impl MaterializeResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalRequest {
    /// Where Stripe sends the user back; defaults to the dashboard.
    #[serde(default)]
    pub return_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        assert_eq!(
            serde_json::to_value(MaterializeResponse::success("Created 2 tasks in ClickUp."))
                .unwrap(),
            serde_json::json!({"status": "success", "message": "Created 2 tasks in ClickUp."})
        );
        assert_eq!(
            serde_json::to_value(MaterializeResponse::error("ClickUp access token not found."))
                .unwrap(),
            serde_json::json!({"status": "error", "error": "ClickUp access token not found."})
        );
    }

    #[test]
    fn test_materialize_request_camel_case() {
        let req: MaterializeRequest = serde_json::from_str(
            r#"{"listId":"901","startDate":"2024-03-01","documentText":"Plan"}"#,
        )
        .unwrap();
        assert_eq!(req.list_id, "901");
        assert_eq!(req.start_date.as_deref(), Some("2024-03-01"));
        assert_eq!(req.document_text.as_deref(), Some("Plan"));
        assert!(req.tasks.is_none());
    }
}
