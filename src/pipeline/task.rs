use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::{
    foundation::error::{ErrorKind, ReelError, ReelResult},
    timeline::model::{ProjectId, TaskId},
};

/// `pending → processing → {completed | failed}`; nothing skips `processing`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt at producing a project's artifact.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderTask {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub status: TaskStatus,
    /// 0–100, never decreasing while processing.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl RenderTask {
    pub fn new(id: TaskId, project_id: ProjectId) -> Self {
        Self {
            id,
            project_id,
            status: TaskStatus::Pending,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            error_kind: None,
            output: None,
        }
    }

    pub fn start(&mut self) -> ReelResult<()> {
        if self.status != TaskStatus::Pending {
            return Err(ReelError::evaluation(format!(
                "task {} cannot start from '{}'",
                self.id, self.status
            )));
        }
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Raise progress; lower values are ignored. Only `complete` reaches 100.
    pub fn advance(&mut self, progress: u8) {
        if self.status == TaskStatus::Processing {
            self.progress = self.progress.max(progress.min(99));
        }
    }

    pub fn complete(&mut self, output: Option<PathBuf>) -> ReelResult<()> {
        if self.status != TaskStatus::Processing {
            return Err(ReelError::evaluation(format!(
                "task {} cannot complete from '{}'",
                self.id, self.status
            )));
        }
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        self.output = output;
        Ok(())
    }

    /// Record a failure. A pending task passes through `processing` first; a task that already
    /// ended is left alone.
    pub fn fail(&mut self, err: &ReelError) {
        match self.status {
            TaskStatus::Completed | TaskStatus::Failed => return,
            TaskStatus::Pending => {
                self.status = TaskStatus::Processing;
                self.started_at = Some(Utc::now());
            }
            TaskStatus::Processing => {}
        }
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(err.to_string());
        self.error_kind = Some(err.kind());
    }
}
