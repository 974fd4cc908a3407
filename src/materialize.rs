//! Task graph materializer.
//!
//! Turns a batch of [`Task`]s into ClickUp tasks in two sequential passes:
//!
//! 1. **Creation**: every task in input order, each followed by its subtasks
//!    (created with `parent` set to the new task id). Ids are recorded in a
//!    [`CreatedTaskIndex`] under the task name.
//! 2. **Dependency wiring**: for every task with dependencies, resolve both
//!    ends through the index and link them. Names that resolve to nothing
//!    are dropped and reported in the [`MaterializeReport`], never raised.
//!
//! The first failing write stops the run. Nothing already written is undone;
//! the returned error carries the report up to that point so the failing
//! step can be logged.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::clickup::{NewTask, WorkspaceApi, WorkspaceError};
use crate::profile::{Credential, SharedProfileStore};
use crate::task::{duplicate_names, CreatedTaskIndex, Lookup, Task, TaskId};

/// What to do when two tasks in one batch share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateNamePolicy {
    /// Create both; dependencies on the name resolve to the later task.
    #[default]
    LastWriteWins,
    /// Refuse the batch before any write.
    Reject,
}

/// The write that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FailedStep {
    CreateTask,
    CreateSubtask { subtask: String },
    CreateDependency { depends_on: String },
}

impl std::fmt::Display for FailedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateTask => write!(f, "create task"),
            Self::CreateSubtask { subtask } => write!(f, "create subtask '{}'", subtask),
            Self::CreateDependency { depends_on } => {
                write!(f, "create dependency on '{}'", depends_on)
            }
        }
    }
}

/// Per-task progress of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub id: Option<TaskId>,
    pub subtask_ids: Vec<TaskId>,
    /// Ids this task was linked to as depending on.
    pub linked_dependencies: Vec<TaskId>,
    /// Dependency names that matched no task in the batch.
    pub dangling_dependencies: Vec<String>,
    pub failed: Option<FailedStep>,
}

/// Everything a run did, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    pub tasks: Vec<TaskRecord>,
}

impl MaterializeReport {
    /// Ids of the created top-level tasks, in input order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().filter_map(|t| t.id.clone()).collect()
    }

    pub fn subtask_count(&self) -> usize {
        self.tasks.iter().map(|t| t.subtask_ids.len()).sum()
    }

    pub fn dependency_count(&self) -> usize {
        self.tasks.iter().map(|t| t.linked_dependencies.len()).sum()
    }

    pub fn dangling_count(&self) -> usize {
        self.tasks.iter().map(|t| t.dangling_dependencies.len()).sum()
    }

    /// The task whose step failed, if any.
    pub fn failure(&self) -> Option<(&str, &FailedStep)> {
        self.tasks
            .iter()
            .find_map(|t| t.failed.as_ref().map(|step| (t.name.as_str(), step)))
    }
}

/// Why a run failed. `Display` is the message shown to the user.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("ClickUp access token not found.")]
    MissingCredential,

    #[error("Failed to look up ClickUp access token.")]
    CredentialLookup(String),

    #[error("Duplicate task names in batch: {}", .0.join(", "))]
    DuplicateNames(Vec<String>),

    #[error("Failed to create tasks in ClickUp.")]
    Write {
        task: String,
        step: FailedStep,
        #[source]
        source: WorkspaceError,
        report: Box<MaterializeReport>,
    },
}

pub struct Materializer {
    workspace: Arc<dyn WorkspaceApi>,
    profiles: SharedProfileStore,
    duplicate_names: DuplicateNamePolicy,
}

impl Materializer {
    pub fn new(
        workspace: Arc<dyn WorkspaceApi>,
        profiles: SharedProfileStore,
        duplicate_names: DuplicateNamePolicy,
    ) -> Self {
        Self {
            workspace,
            profiles,
            duplicate_names,
        }
    }

    /// Look up the user's credential, then materialize.
    ///
    /// A user without a credential gets [`MaterializeError::MissingCredential`]
    /// and no write is issued.
    pub async fn materialize_for_user(
        &self,
        user_id: &str,
        tasks: &[Task],
        list_id: &str,
        start_date: Option<NaiveDate>,
    ) -> Result<MaterializeReport, MaterializeError> {
        let credential = match self.profiles.access_token(user_id).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                tracing::warn!(user_id, "No ClickUp access token on profile");
                return Err(MaterializeError::MissingCredential);
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Credential lookup failed");
                return Err(MaterializeError::CredentialLookup(e.to_string()));
            }
        };

        self.materialize(tasks, list_id, start_date, &credential)
            .await
    }

    /// Create `tasks` in `list_id` and wire their dependencies.
    pub async fn materialize(
        &self,
        tasks: &[Task],
        list_id: &str,
        start_date: Option<NaiveDate>,
        credential: &Credential,
    ) -> Result<MaterializeReport, MaterializeError> {
        let duplicates = duplicate_names(tasks);
        if !duplicates.is_empty() {
            match self.duplicate_names {
                DuplicateNamePolicy::Reject => {
                    return Err(MaterializeError::DuplicateNames(duplicates));
                }
                DuplicateNamePolicy::LastWriteWins => {
                    tracing::warn!(
                        ?duplicates,
                        "Duplicate task names; dependencies will resolve to the last one"
                    );
                }
            }
        }

        tracing::info!(list_id, tasks = tasks.len(), "Materializing task batch");

        let mut report = MaterializeReport::default();
        let mut index = CreatedTaskIndex::new();

        // Pass 1: tasks and their subtasks.
        for task in tasks {
            report.tasks.push(TaskRecord {
                name: task.name.clone(),
                ..Default::default()
            });
            let position = report.tasks.len() - 1;

            let new_task = NewTask {
                name: task.name.clone(),
                description: task.description.clone(),
                start_date,
                parent: None,
            };
            let task_id = match self
                .workspace
                .create_task(credential, list_id, &new_task)
                .await
            {
                Ok(id) => id,
                Err(e) => return Err(fail(report, position, FailedStep::CreateTask, e)),
            };

            if let Some(replaced) = index.record(&task.name, task_id.clone()) {
                tracing::debug!(name = %task.name, %replaced, "Task name re-recorded");
            }
            report.tasks[position].id = Some(task_id.clone());

            for subtask in &task.subtasks {
                let new_subtask = NewTask {
                    name: subtask.name.clone(),
                    description: subtask.description.clone(),
                    start_date: None,
                    parent: Some(task_id.clone()),
                };
                match self
                    .workspace
                    .create_task(credential, list_id, &new_subtask)
                    .await
                {
                    Ok(id) => report.tasks[position].subtask_ids.push(id),
                    Err(e) => {
                        let step = FailedStep::CreateSubtask {
                            subtask: subtask.name.clone(),
                        };
                        return Err(fail(report, position, step, e));
                    }
                }
            }
        }

        // Pass 2: dependencies, now that every name has an id.
        for (position, task) in tasks.iter().enumerate() {
            if task.dependencies.is_empty() {
                continue;
            }
            let task_id = match index.resolve(&task.name) {
                Lookup::Found(id) => id.clone(),
                Lookup::NotFound => continue,
            };

            for dependency in &task.dependencies {
                let depends_on = match index.resolve(dependency) {
                    Lookup::Found(id) => id.clone(),
                    Lookup::NotFound => {
                        tracing::debug!(
                            task = %task.name,
                            dependency = %dependency,
                            "Dropping dependency on a task outside the batch"
                        );
                        report.tasks[position]
                            .dangling_dependencies
                            .push(dependency.clone());
                        continue;
                    }
                };

                if let Err(e) = self
                    .workspace
                    .add_dependency(credential, &task_id, &depends_on)
                    .await
                {
                    let step = FailedStep::CreateDependency {
                        depends_on: dependency.clone(),
                    };
                    return Err(fail(report, position, step, e));
                }
                report.tasks[position].linked_dependencies.push(depends_on);
            }
        }

        tracing::info!(
            list_id,
            tasks = report.tasks.len(),
            subtasks = report.subtask_count(),
            dependencies = report.dependency_count(),
            dangling = report.dangling_count(),
            "Materialized task batch"
        );

        Ok(report)
    }
}

fn fail(
    mut report: MaterializeReport,
    position: usize,
    step: FailedStep,
    source: WorkspaceError,
) -> MaterializeError {
    let task = report.tasks[position].name.clone();
    tracing::error!(
        task = %task,
        step = %step,
        created = report.task_ids().len(),
        error = %source,
        "ClickUp write failed; stopping run"
    );
    report.tasks[position].failed = Some(step.clone());
    MaterializeError::Write {
        task,
        step,
        source,
        report: Box::new(report),
    }
}
