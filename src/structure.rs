//! Turning document text into a proposed task list with an LLM.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::llm::{ChatMessage, ChatOptions, LlmClient, LlmError, ResponseFormat};
use crate::task::{Subtask, Task};

const SYSTEM_PROMPT: &str = "You are an expert project manager tasked with extracting tasks, \
subtasks, and dependencies from a document. The document will be passed to you as text.

Analyze the document and identify key project tasks, subtasks, and any dependencies between them. \
Respond with a JSON object of the form {\"tasks\": [...]}. Each task has a \"name\", a \
\"description\", an optional \"subtasks\" array (each with a \"name\" and \"description\"), and an \
optional \"dependencies\" array holding the exact names of other tasks in the same list.";

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("no tasks found")]
    NoTasks,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Could not parse task list from model output: {0}")]
    Parse(String),
}

#[async_trait]
pub trait TaskStructurer: Send + Sync {
    /// Propose tasks for `document_text`. Never returns an empty list.
    async fn structure(&self, document_text: &str) -> Result<Vec<Task>, StructureError>;
}

pub struct LlmTaskStructurer {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl LlmTaskStructurer {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TaskStructurer for LlmTaskStructurer {
    async fn structure(&self, document_text: &str) -> Result<Vec<Task>, StructureError> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Here is the document:\n\n{}", document_text)),
        ];
        let options = ChatOptions {
            temperature: Some(0.0),
            response_format: ResponseFormat::JsonObject,
            ..Default::default()
        };

        let response = self
            .llm
            .chat_completion_with_options(&self.model, &messages, options)
            .await?;
        let content = response.content.unwrap_or_default();

        let tasks = parse_tasks(&content)?;
        tracing::info!(
            tasks = tasks.len(),
            model = %self.model,
            "Structured document into tasks"
        );
        Ok(tasks)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReply {
    Wrapped { tasks: Vec<RawTask> },
    Bare(Vec<RawTask>),
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    subtasks: Option<Vec<RawSubtask>>,
    #[serde(default)]
    dependencies: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parse and normalize model output into tasks.
pub fn parse_tasks(content: &str) -> Result<Vec<Task>, StructureError> {
    let body = strip_code_fence(content);
    if body.is_empty() {
        return Err(StructureError::NoTasks);
    }

    let raw = match serde_json::from_str::<RawReply>(body)
        .map_err(|e| StructureError::Parse(e.to_string()))?
    {
        RawReply::Wrapped { tasks } | RawReply::Bare(tasks) => tasks,
    };

    let tasks: Vec<Task> = raw.into_iter().filter_map(normalize).collect();
    if tasks.is_empty() {
        return Err(StructureError::NoTasks);
    }
    Ok(tasks)
}

fn normalize(raw: RawTask) -> Option<Task> {
    let name = non_empty(raw.name)?;
    let subtasks = raw
        .subtasks
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| {
            Some(Subtask::new(
                non_empty(s.name)?,
                s.description.unwrap_or_default().trim(),
            ))
        })
        .collect();
    let dependencies = raw
        .dependencies
        .unwrap_or_default()
        .into_iter()
        .filter_map(|d| non_empty(Some(d)))
        .collect();

    Some(Task {
        name,
        description: raw.description.unwrap_or_default().trim().to_string(),
        subtasks,
        dependencies,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, LlmErrorKind};
    use std::sync::Mutex;

    struct ScriptedLlm {
        reply: Result<String, LlmError>,
        seen: Mutex<Vec<(String, Vec<ChatMessage>, ChatOptions)>>,
    }

    impl ScriptedLlm {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion_with_options(
            &self,
            model: &str,
            messages: &[ChatMessage],
            options: ChatOptions,
        ) -> Result<ChatResponse, LlmError> {
            self.seen
                .lock()
                .unwrap()
                .push((model.to_string(), messages.to_vec(), options));
            self.reply.clone().map(|content| ChatResponse {
                content: Some(content),
                finish_reason: Some("stop".to_string()),
                usage: None,
                model: Some(model.to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_structure_sends_document_in_json_mode() {
        let llm = Arc::new(ScriptedLlm::replying(
            r#"{"tasks":[{"name":"Design","description":"Draw","subtasks":[{"name":"Wireframes","description":""}]},
                         {"name":"Build","description":"Code","dependencies":["Design"]}]}"#,
        ));
        let structurer = LlmTaskStructurer::new(llm.clone(), "test-model");

        let tasks = structurer.structure("Design then build.").await.unwrap();
        assert_eq!(
            tasks,
            vec![
                Task::new("Design", "Draw").with_subtask(Subtask::new("Wireframes", "")),
                Task::new("Build", "Code").depends_on("Design"),
            ]
        );

        let seen = llm.seen.lock().unwrap();
        let (model, messages, options) = &seen[0];
        assert_eq!(model, "test-model");
        assert!(messages[1].content.contains("Design then build."));
        assert_eq!(options.response_format, ResponseFormat::JsonObject);
        assert_eq!(options.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let llm = Arc::new(ScriptedLlm {
            reply: Err(LlmError::from_status(503, "overloaded".to_string())),
            seen: Mutex::new(Vec::new()),
        });
        let structurer = LlmTaskStructurer::new(llm, "m");
        match structurer.structure("text").await {
            Err(StructureError::Llm(e)) => assert_eq!(e.kind, LlmErrorKind::ServerError),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_fenced_bare_array() {
        let content = "```json\n[{\"name\":\"  Ship  \",\"description\":null}]\n```";
        assert_eq!(parse_tasks(content).unwrap(), vec![Task::new("Ship", "")]);
    }

    #[test]
    fn test_normalize_drops_blank_names() {
        let content = r#"{"tasks":[
            {"name":" ","description":"orphan"},
            {"name":"Test","subtasks":[{"name":""},{"name":"Unit"}],"dependencies":["", " Build "]}
        ]}"#;
        assert_eq!(
            parse_tasks(content).unwrap(),
            vec![Task::new("Test", "")
                .with_subtask(Subtask::new("Unit", ""))
                .depends_on("Build")]
        );
    }

    #[test]
    fn test_no_tasks() {
        assert!(matches!(parse_tasks(r#"{"tasks":[]}"#), Err(StructureError::NoTasks)));
        assert!(matches!(parse_tasks("   "), Err(StructureError::NoTasks)));
        assert!(matches!(
            parse_tasks(r#"[{"name":""}]"#),
            Err(StructureError::NoTasks)
        ));
        assert_eq!(StructureError::NoTasks.to_string(), "no tasks found");
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            parse_tasks("I could not find any tasks."),
            Err(StructureError::Parse(_))
        ));
    }
}
