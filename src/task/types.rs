//! Batch types shared by the structurer, the API and the materializer.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier assigned to a task by the external workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A child item of a [`Task`], created once the parent exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Subtask {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A proposed top-level task.
///
/// `name` doubles as the key other tasks use in `dependencies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Subtask>,
    /// Names of tasks in the same batch this task depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            subtasks: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_subtask(mut self, subtask: Subtask) -> Self {
        self.subtasks.push(subtask);
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }
}

/// Names that occur more than once in `tasks`, in first-repeat order.
pub fn duplicate_names(tasks: &[Task]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut repeated = Vec::new();
    for task in tasks {
        if !seen.insert(task.name.as_str()) && !repeated.contains(&task.name) {
            repeated.push(task.name.clone());
        }
    }
    repeated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_optional_fields() {
        let task: Task = serde_json::from_str(r#"{"name": "Design"}"#).unwrap();
        assert_eq!(task.name, "Design");
        assert!(task.description.is_empty());
        assert!(task.subtasks.is_empty());
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_serialize_skips_empty_lists() {
        let value = serde_json::to_value(Task::new("Build", "Write code")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"name": "Build", "description": "Write code"})
        );
    }

    #[test]
    fn test_duplicate_names() {
        let tasks = vec![
            Task::new("A", ""),
            Task::new("B", ""),
            Task::new("A", ""),
            Task::new("A", ""),
        ];
        assert_eq!(duplicate_names(&tasks), vec!["A".to_string()]);
        assert!(duplicate_names(&tasks[..2]).is_empty());
    }
}
