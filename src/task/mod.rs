//! Task module - the batch of proposed tasks and the index of created ones.
//!
//! A batch is what the structurer produces and the materializer consumes:
//! - Tasks are keyed by name; dependencies refer to other tasks by name
//! - Subtasks belong to exactly one task and have no identity of their own
//! - The [`CreatedTaskIndex`] maps batch names to workspace-assigned ids

mod index;
mod types;

pub use index::{CreatedTaskIndex, Lookup};
pub use types::{duplicate_names, Subtask, Task, TaskId};
