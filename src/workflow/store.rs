//! Durable checkpoint of the current run
//!
//! One JSON document at one path. Writes go to a temp file in the same
//! directory and are renamed over the target, so a reader never sees a
//! half-written document. There is no cross-process locking: two processes
//! resuming the same run will overwrite each other.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::state::WorkflowContext;
use crate::{Error, Result};

/// Default location of the checkpoint file
pub const DEFAULT_STATE_PATH: &str = ".stagehand/workflow_state.json";

/// Reads and writes the persisted [`WorkflowContext`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_STATE_PATH))
    }
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the checkpoint with `context`
    pub fn save(&self, context: &WorkflowContext) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let content = serde_json::to_vec_pretty(context)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| {
            Error::Persistence(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        debug!("Saved run {} to {}", context.id, self.path.display());
        Ok(())
    }

    /// Load the checkpoint.
    ///
    /// `None` when there is no file, or it cannot be read, parsed or does not
    /// hold a consistent run.
    pub fn load(&self) -> Option<WorkflowContext> {
        if !self.path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return None;
            }
        };

        let context: WorkflowContext = match serde_json::from_str(&content) {
            Ok(context) => context,
            Err(e) => {
                warn!("Ignoring unparseable state {}: {}", self.path.display(), e);
                return None;
            }
        };

        if let Err(e) = context.validate() {
            warn!("Ignoring inconsistent state {}: {}", self.path.display(), e);
            return None;
        }

        Some(context)
    }

    /// Delete the checkpoint; succeeds if there is none
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Save, logging instead of failing.
    ///
    /// A run keeps going on in-memory state when the checkpoint cannot be
    /// written.
    pub fn checkpoint(&self, context: &WorkflowContext) {
        if let Err(e) = self.save(context) {
            warn!(
                "Could not persist run {} to {}: {}",
                context.id,
                self.path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::handler::AgentResult;
    use crate::workflow::state::{Payload, StageStatus};
    use crate::workflow::task_type::TaskType;
    use serde_json::Value;

    fn sample() -> WorkflowContext {
        let mut metadata = Payload::new();
        metadata.insert("branch".to_string(), Value::from("feature/x"));
        let mut ctx = WorkflowContext::new(
            "Add GraphQL endpoint",
            TaskType::BackendBuild,
            vec!["backend-build".into(), "unit-test".into(), "review".into()],
            metadata,
        );
        ctx.start();

        let mut input = Payload::new();
        input.insert("task".to_string(), Value::from("Add GraphQL endpoint"));
        ctx.start_stage("backend-build", input);
        let mut out = Payload::new();
        out.insert("files".to_string(), serde_json::json!(["schema.graphql"]));
        ctx.finish_stage("backend-build", &AgentResult::success(out));
        ctx.start_stage("unit-test", Payload::new());
        ctx
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.json"));
        let ctx = sample();

        store.save(&ctx).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, ctx);
        assert_eq!(loaded.task_type, TaskType::BackendBuild);
        assert_eq!(loaded.stages["unit-test"].status, StageStatus::InProgress);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let mut ctx = sample();

        store.save(&ctx).unwrap();
        ctx.complete();
        store.save(&ctx).unwrap();

        assert!(store.load().unwrap().is_terminal());
        // only the state file, no stray temp files
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_missing_or_corrupt_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().is_none());

        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        store.clear().unwrap();
        store.save(&sample()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_checkpoint_swallows_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // parent is a regular file, so the directory cannot be created
        let store = StateStore::new(blocker.join("state.json"));

        assert!(store.save(&sample()).is_err());
        store.checkpoint(&sample());
    }
}
