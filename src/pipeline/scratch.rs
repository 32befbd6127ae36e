use std::path::{Path, PathBuf};

use crate::{
    foundation::error::{ReelError, ReelResult},
    timeline::model::TaskId,
};

/// Per-task temporary directory, removed when dropped.
#[derive(Debug)]
pub struct TaskScratch {
    dir: PathBuf,
}

impl TaskScratch {
    pub fn create(work_dir: &Path, task: TaskId) -> ReelResult<Self> {
        let dir = work_dir.join(format!("task_{task}"));
        if dir.exists() {
            // Left over from an interrupted run of the same task id.
            let _ = std::fs::remove_dir_all(&dir);
        }
        std::fs::create_dir_all(&dir).map_err(|e| {
            ReelError::encoding(format!(
                "failed to create scratch directory '{}': {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for TaskScratch {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "failed to remove scratch directory");
        }
    }
}
