//! ClickUp workspace integration.
//!
//! The materializer only sees the [`WorkspaceApi`] trait; [`ClickUpClient`]
//! is the production implementation and [`oauth`] handles connecting a user's
//! account.

mod client;
mod error;
pub mod oauth;

pub use client::ClickUpClient;
pub use error::{WorkspaceError, WorkspaceErrorKind};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::profile::Credential;
use crate::task::TaskId;

/// A task to create in a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    /// Set for subtasks.
    pub parent: Option<TaskId>,
}

/// Write operations against the external workspace.
#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    /// Create a task (or subtask, when `task.parent` is set) in `list_id`.
    async fn create_task(
        &self,
        credential: &Credential,
        list_id: &str,
        task: &NewTask,
    ) -> Result<TaskId, WorkspaceError>;

    /// Record that `task_id` depends on `depends_on`.
    async fn add_dependency(
        &self,
        credential: &Credential,
        task_id: &TaskId,
        depends_on: &TaskId,
    ) -> Result<(), WorkspaceError>;
}
