//! Task registry: task path → implementation plus metadata.
//!
//! Populated at startup. Metadata can be declared in code or overridden
//! from a TOML tasks file:
//!
//! ```toml
//! [[task]]
//! path = "tasks.echo"
//! timeout_secs = 30
//! result_ttl_secs = 3600
//! cancel_on_retry = false
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

use super::{Task, TaskMeta, TaskMetaEntry};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct TasksFile {
    #[serde(default)]
    task: Vec<TaskMetaEntry>,
}

/// A resolved task: logic plus declared metadata.
#[derive(Clone)]
pub struct RegisteredTask {
    pub task: Arc<dyn Task>,
    pub meta: TaskMeta,
}

impl std::fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTask")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, RegisteredTask>,
    /// Metadata for paths this process does not execute (e.g. a producer
    /// that only inspects jobs) still resolves timeouts and TTLs.
    meta_only: HashMap<String, TaskMeta>,
}

impl TaskRegistry {
    /// Create an empty registry with no tasks.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a task under `path`. Metadata comes from a previously
    /// loaded tasks file if it named this path, defaults otherwise.
    pub fn register(&mut self, path: impl Into<String>, task: impl Task + 'static) -> &mut Self {
        let path = path.into();
        let meta = self.meta_only.remove(&path).unwrap_or_default();
        self.register_with_meta(path, task, meta)
    }

    pub fn register_with_meta(
        &mut self,
        path: impl Into<String>,
        task: impl Task + 'static,
        meta: TaskMeta,
    ) -> &mut Self {
        self.tasks.insert(
            path.into(),
            RegisteredTask {
                task: Arc::new(task),
                meta,
            },
        );
        self
    }

    /// Look up the task for `path`.
    pub fn resolve(&self, path: &str) -> Result<&RegisteredTask> {
        self.tasks
            .get(path)
            .ok_or_else(|| Error::TaskNotFound(path.to_string()))
    }

    /// Metadata for `path`, falling back to defaults for unknown paths.
    pub fn meta(&self, path: &str) -> TaskMeta {
        self.tasks
            .get(path)
            .map(|t| t.meta)
            .or_else(|| self.meta_only.get(path).copied())
            .unwrap_or_default()
    }

    /// Registered task paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Apply metadata overrides from a TOML tasks file.
    pub fn load_meta_file(&mut self, file: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(file).map_err(|e| {
            Error::Config(format!("cannot read tasks file {}: {e}", file.display()))
        })?;
        let parsed: TasksFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad tasks file {}: {e}", file.display())))?;
        Ok(self.apply_entries(parsed.task))
    }

    /// Apply metadata overrides from TOML text. Returns the entry count.
    pub fn load_meta_str(&mut self, content: &str) -> Result<usize> {
        let parsed: TasksFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad tasks config: {e}")))?;
        Ok(self.apply_entries(parsed.task))
    }

    fn apply_entries(&mut self, entries: Vec<TaskMetaEntry>) -> usize {
        let count = entries.len();
        for entry in entries {
            let (path, meta) = entry.into_meta();
            match self.tasks.get_mut(&path) {
                Some(registered) => registered.meta = meta,
                None => {
                    self.meta_only.insert(path, meta);
                }
            }
        }
        count
    }
}
