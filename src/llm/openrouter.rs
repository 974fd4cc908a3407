//! OpenRouter API client implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient, ResponseFormat, TokenUsage};
use crate::config::LlmConfig;

/// OpenRouter API client. Each call is a single request; failures surface as-is.
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl OpenRouterClient {
    /// `api_url` is the chat-completions endpoint.
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.api_key.clone(), config.api_url.clone())
    }

    async fn execute_request(&self, request: &OpenRouterRequest<'_>) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "Archie")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network_error(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    LlmError::network_error(format!("Connection failed: {}", e))
                } else {
                    LlmError::network_error(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network_error(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let error = LlmError::from_status(status.as_u16(), body);
            tracing::error!("Request failed: {}", error);
            return Err(error);
        }

        let parsed: OpenRouterResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::parse_error(format!("Failed to parse response: {}, body: {}", e, body))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse_error("No choices in response".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content,
            finish_reason: choice.finish_reason,
            usage: parsed
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
            model: parsed.model.or_else(|| Some(request.model.to_string())),
        })
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn chat_completion_with_options(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = OpenRouterRequest {
            model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: match options.response_format {
                ResponseFormat::Text => None,
                ResponseFormat::JsonObject => Some(RequestFormat {
                    format_type: "json_object",
                }),
            },
        };

        tracing::debug!("Sending request to OpenRouter: model={}", model);
        let response = self.execute_request(&request).await?;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenRouter usage"
            );
        }
        Ok(response)
    }
}

/// OpenRouter API request format.
#[derive(Debug, Serialize)]
struct OpenRouterRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<RequestFormat>,
}

#[derive(Debug, Serialize)]
struct RequestFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// OpenRouter API response format.
#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
    #[serde(default)]
    usage: Option<OpenRouterUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterMessage {
    content: Option<String>,
}

/// Usage data (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct OpenRouterUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_json_mode_request() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer or-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "google/gemini-2.5-flash",
                "temperature": 0.0,
                "response_format": {"type": "json_object"},
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "doc"}
                ]
            })))
            .with_status(200)
            .with_body(
                r#"{"choices":[{"message":{"content":"{\"tasks\":[]}"},"finish_reason":"stop"}],
                    "usage":{"prompt_tokens":10,"completion_tokens":4,"total_tokens":14}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = OpenRouterClient::new("or-key", format!("{}/chat/completions", server.url()));
        let options = ChatOptions {
            temperature: Some(0.0),
            response_format: ResponseFormat::JsonObject,
            ..Default::default()
        };
        let response = client
            .chat_completion_with_options(
                "google/gemini-2.5-flash",
                &[ChatMessage::system("sys"), ChatMessage::user("doc")],
                options,
            )
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some(r#"{"tasks":[]}"#));
        assert_eq!(response.usage, Some(TokenUsage::new(10, 4)));
        assert_eq!(response.model.as_deref(), Some("google/gemini-2.5-flash"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_classified() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .expect(1)
            .create_async()
            .await;

        let client = OpenRouterClient::new("or-key", format!("{}/chat/completions", server.url()));
        let err = client
            .chat_completion("m", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::RateLimited);
        // No retry on failure.
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = OpenRouterClient::new("or-key", format!("{}/chat/completions", server.url()));
        let err = client
            .chat_completion("m", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::ParseError);
    }
}
