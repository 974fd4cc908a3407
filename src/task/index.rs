//! Name-to-id index built while a batch is being created.

use std::collections::HashMap;

use super::types::TaskId;

/// Result of resolving a batch-local name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a TaskId),
    NotFound,
}

impl<'a> Lookup<'a> {
    pub fn found(self) -> Option<&'a TaskId> {
        match self {
            Lookup::Found(id) => Some(id),
            Lookup::NotFound => None,
        }
    }
}

/// Maps task names to the ids the workspace assigned during creation.
///
/// Inserting a name twice replaces the earlier id; the replaced id is
/// returned so callers can log it.
#[derive(Debug, Clone, Default)]
pub struct CreatedTaskIndex {
    ids: HashMap<String, TaskId>,
}

impl CreatedTaskIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, id: TaskId) -> Option<TaskId> {
        self.ids.insert(name.to_string(), id)
    }

    /// Exact-match lookup; no normalization of case or whitespace.
    pub fn resolve(&self, name: &str) -> Lookup<'_> {
        match self.ids.get(name) {
            Some(id) => Lookup::Found(id),
            None => Lookup::NotFound,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_found_and_missing() {
        let mut index = CreatedTaskIndex::new();
        assert!(index.is_empty());
        index.record("Design", TaskId::new("t1"));

        assert_eq!(index.resolve("Design"), Lookup::Found(&TaskId::new("t1")));
        assert_eq!(index.resolve("design"), Lookup::NotFound);
        assert_eq!(index.resolve("Design ").found(), None);
    }

    #[test]
    fn test_later_record_wins() {
        let mut index = CreatedTaskIndex::new();
        assert_eq!(index.record("A", TaskId::new("first")), None);
        assert_eq!(
            index.record("A", TaskId::new("second")),
            Some(TaskId::new("first"))
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.resolve("A").found(), Some(&TaskId::new("second")));
    }
}
