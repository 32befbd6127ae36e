use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError, mpsc},
};

use crate::{
    foundation::error::ErrorKind,
    pipeline::task::{RenderTask, TaskStatus},
    timeline::model::{ProjectId, TaskId},
};

/// Status update pushed to a project's subscribers.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProgressEvent {
    pub project_id: ProjectId,
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: String,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ProgressEvent {
    pub fn scene_boundary(task: &RenderTask, done: usize, total: usize) -> Self {
        Self {
            project_id: task.project_id,
            task_id: task.id,
            status: TaskStatus::Processing,
            message: format!("Rendered scene {done} of {total}"),
            progress: task.progress,
            output_url: None,
            error_kind: None,
        }
    }

    /// Final event for a task that has reached `completed` or `failed`.
    pub fn terminal(task: &RenderTask) -> Self {
        let message = match task.status {
            TaskStatus::Completed => "Video rendering completed".to_string(),
            _ => task
                .error_message
                .clone()
                .unwrap_or_else(|| "Video rendering failed".to_string()),
        };
        Self {
            project_id: task.project_id,
            task_id: task.id,
            status: task.status,
            message,
            progress: task.progress,
            output_url: task.output.as_ref().map(|p| p.display().to_string()),
            error_kind: task.error_kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Best-effort sender: a dropped receiver never fails the render.
#[derive(Clone, Debug, Default)]
pub struct ProgressTx(Option<mpsc::Sender<ProgressEvent>>);

impl ProgressTx {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self(Some(tx))
    }

    /// Discards every event.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn channel() -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.0
            && tx.send(event).is_err()
        {
            tracing::trace!("progress receiver gone; event dropped");
        }
    }
}

/// Per-project subscriber groups.
#[derive(Debug, Default)]
pub struct ProgressHub {
    groups: Mutex<HashMap<ProjectId, Vec<mpsc::Sender<ProgressEvent>>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, project: ProjectId) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel();
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(project)
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver to every live subscriber of the event's project; disconnected ones are pruned.
    pub fn publish(&self, event: &ProgressEvent) {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(subs) = groups.get_mut(&event.project_id) else {
            return;
        };
        subs.retain(|tx| tx.send(event.clone()).is_ok());
        if subs.is_empty() {
            groups.remove(&event.project_id);
        }
    }

    pub fn subscriber_count(&self, project: ProjectId) -> usize {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&project)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(project: u64) -> ProgressEvent {
        let mut task = RenderTask::new(TaskId(1), ProjectId(project));
        task.start().unwrap();
        ProgressEvent::scene_boundary(&task, 1, 2)
    }

    #[test]
    fn events_reach_only_their_project_group() {
        let hub = ProgressHub::new();
        let a = hub.subscribe(ProjectId(1));
        let b = hub.subscribe(ProjectId(2));
        hub.publish(&event(1));
        assert_eq!(a.try_recv().unwrap().message, "Rendered scene 1 of 2");
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let hub = ProgressHub::new();
        let rx = hub.subscribe(ProjectId(1));
        let _keep = hub.subscribe(ProjectId(1));
        drop(rx);
        hub.publish(&event(1));
        assert_eq!(hub.subscriber_count(ProjectId(1)), 1);
    }

    #[test]
    fn sending_without_receiver_is_silent() {
        let (tx, rx) = ProgressTx::channel();
        drop(rx);
        tx.send(event(1));
        ProgressTx::none().send(event(1));
    }

    #[test]
    fn terminal_event_carries_output_and_error() {
        let mut task = RenderTask::new(TaskId(3), ProjectId(1));
        task.start().unwrap();
        task.complete(Some("out/project_1_task_3.mp4".into())).unwrap();
        let ev = ProgressEvent::terminal(&task);
        assert!(ev.is_terminal());
        assert_eq!(ev.progress, 100);
        assert_eq!(ev.output_url.as_deref(), Some("out/project_1_task_3.mp4"));

        let mut failed = RenderTask::new(TaskId(4), ProjectId(1));
        failed.fail(&crate::foundation::error::ReelError::Cancelled);
        let ev = ProgressEvent::terminal(&failed);
        assert_eq!(ev.status, TaskStatus::Failed);
        assert_eq!(ev.message, "render cancelled");
        assert_eq!(ev.error_kind, Some(ErrorKind::Cancelled));
    }
}
