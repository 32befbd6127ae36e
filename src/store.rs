use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::Context;

use crate::{
    foundation::error::{ReelError, ReelResult},
    pipeline::{
        progress::ProgressEvent,
        task::{RenderTask, TaskStatus},
    },
    timeline::{
        model::{Project, ProjectId, ProjectStatus, TaskId},
        template::{IdAllocator, Template},
        validate::{validate_project, violations_to_error},
    },
};

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct StoreState {
    projects: BTreeMap<ProjectId, Project>,
    /// Append-only; a project's last entry is its authoritative attempt.
    tasks: Vec<RenderTask>,
    #[serde(default)]
    ids: IdAllocator,
    next_project: u64,
    next_task: u64,
    /// Task currently holding each `processing` project.
    #[serde(skip)]
    active: HashMap<ProjectId, TaskId>,
}

impl StoreState {
    fn project_mut(&mut self, id: ProjectId) -> ReelResult<&mut Project> {
        self.projects
            .get_mut(&id)
            .ok_or_else(|| ReelError::validation(format!("project {id} does not exist")))
    }

    fn task_mut(&mut self, id: TaskId) -> Option<&mut RenderTask> {
        self.tasks.iter_mut().rev().find(|t| t.id == id)
    }
}

/// In-memory project repository with render-task history.
///
/// Enforces the lifecycle rules: edits only in `draft`/`failed`, one active task per project,
/// and all-or-nothing template application.
#[derive(Debug, Default)]
pub struct ProjectStore {
    state: Mutex<StoreState>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty `draft` project.
    pub fn create(&self, title: impl Into<String>) -> Project {
        let mut st = self.lock();
        st.next_project += 1;
        let project = Project::new(ProjectId(st.next_project), title);
        st.projects.insert(project.id, project.clone());
        project
    }

    /// Store a project built elsewhere (e.g. loaded from JSON). A zero id gets a fresh one; scene and
    /// element ids already present are reserved.
    pub fn insert(&self, mut project: Project) -> ReelResult<ProjectId> {
        let mut st = self.lock();
        if project.id == ProjectId::default() {
            st.next_project += 1;
            project.id = ProjectId(st.next_project);
        } else if st.projects.contains_key(&project.id) {
            return Err(ReelError::validation(format!(
                "project {} already exists",
                project.id
            )));
        }
        st.next_project = st.next_project.max(project.id.0);
        st.ids.observe(&project);
        let id = project.id;
        st.projects.insert(id, project);
        Ok(id)
    }

    pub fn get(&self, id: ProjectId) -> ReelResult<Project> {
        self.lock()
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| ReelError::validation(format!("project {id} does not exist")))
    }

    pub fn list(&self) -> Vec<Project> {
        self.lock().projects.values().cloned().collect()
    }

    /// Apply a user edit. Rejected unless the project is `draft` or `failed`.
    pub fn update_draft(&self, id: ProjectId, edit: impl FnOnce(&mut Project)) -> ReelResult<()> {
        let mut st = self.lock();
        let project = st.project_mut(id)?;
        if !project.is_editable() {
            return Err(ReelError::validation(format!(
                "project {id} is '{}' and cannot be edited",
                project.status.as_str()
            )));
        }
        let mut draft = project.clone();
        edit(&mut draft);
        draft.id = id;
        draft.status = project.status;
        *project = draft;
        let snapshot = project.clone();
        st.ids.observe(&snapshot);
        Ok(())
    }

    /// Replace every scene of a project with the template's tree.
    ///
    /// The new tree is built and validated on a copy; on any violation the project is untouched.
    pub fn apply_template(&self, id: ProjectId, template: &Template) -> ReelResult<()> {
        let mut st = self.lock();
        let mut ids = st.ids.clone();
        let project = st.project_mut(id)?;
        if !project.is_editable() {
            return Err(ReelError::validation(format!(
                "project {id} is '{}' and cannot be edited",
                project.status.as_str()
            )));
        }

        let mut candidate = project.clone();
        candidate.scenes = template.structure.materialize(&mut ids);
        candidate.template = Some(template.name.clone());
        let violations = validate_project(&candidate);
        if !violations.is_empty() {
            return Err(violations_to_error(&violations));
        }

        *project = candidate;
        st.ids = ids;
        tracing::info!(project_id = %id, template = %template.name, "template applied");
        Ok(())
    }

    /// Check eligibility and open a new `pending` task; the project becomes `processing`.
    pub fn begin_render(&self, id: ProjectId) -> ReelResult<RenderTask> {
        let mut st = self.lock();
        if let Some(task) = st.active.get(&id) {
            return Err(ReelError::validation(format!(
                "project {id} already has active task {task}"
            )));
        }
        let project = st.project_mut(id)?;
        if !project.is_editable() {
            return Err(ReelError::validation(format!(
                "project {id} is '{}' and cannot be rendered",
                project.status.as_str()
            )));
        }
        if !project.has_render_inputs() {
            return Err(ReelError::validation(format!(
                "project {id} needs a script and either base media or a template"
            )));
        }
        project.status = ProjectStatus::Processing;
        project.progress = 0;
        project.error_message.clear();

        st.next_task += 1;
        let task = RenderTask::new(TaskId(st.next_task), id);
        st.tasks.push(task.clone());
        st.active.insert(id, task.id);
        tracing::info!(project_id = %id, task_id = %task.id, "render task created");
        Ok(task)
    }

    /// Fold a non-terminal progress event into the stored task and project.
    pub fn record_progress(&self, event: &ProgressEvent) {
        if event.is_terminal() {
            return;
        }
        let mut st = self.lock();
        if st.active.get(&event.project_id) != Some(&event.task_id) {
            return;
        }
        if let Some(task) = st.task_mut(event.task_id) {
            if task.status == TaskStatus::Pending {
                let _ = task.start();
            }
            task.advance(event.progress);
        }
        if let Ok(project) = st.project_mut(event.project_id)
            && project.status == ProjectStatus::Processing
        {
            project.progress = project.progress.max(event.progress.min(99));
        }
    }

    /// Record a finished task and move its project to the matching terminal status.
    pub fn finish(&self, mut task: RenderTask) {
        if !task.status.is_terminal() {
            task.fail(&ReelError::evaluation("task ended without a result"));
        }
        let mut st = self.lock();
        if st.active.get(&task.project_id) == Some(&task.id) {
            st.active.remove(&task.project_id);
        }
        if let Ok(project) = st.project_mut(task.project_id) {
            match task.status {
                TaskStatus::Completed => {
                    project.status = ProjectStatus::Completed;
                    project.progress = 100;
                    project.output = task.output.clone();
                    project.error_message.clear();
                }
                _ => {
                    project.status = ProjectStatus::Failed;
                    project.error_message = task.error_message.clone().unwrap_or_default();
                }
            }
        }
        match st.task_mut(task.id) {
            Some(slot) => *slot = task,
            None => st.tasks.push(task),
        }
    }

    pub fn task(&self, id: TaskId) -> Option<RenderTask> {
        self.lock().tasks.iter().rev().find(|t| t.id == id).cloned()
    }

    pub fn tasks_for(&self, project: ProjectId) -> Vec<RenderTask> {
        self.lock()
            .tasks
            .iter()
            .filter(|t| t.project_id == project)
            .cloned()
            .collect()
    }

    /// The most recent attempt, which is authoritative for the project.
    pub fn latest_task(&self, project: ProjectId) -> Option<RenderTask> {
        self.lock()
            .tasks
            .iter()
            .rev()
            .find(|t| t.project_id == project)
            .cloned()
    }

    /// Fail every `processing` project whose task is not live (after a crash or restart).
    pub fn recover_stuck(&self, is_live: impl Fn(TaskId) -> bool) -> Vec<ProjectId> {
        let mut st = self.lock();
        let stuck: Vec<ProjectId> = st
            .projects
            .values()
            .filter(|p| p.status == ProjectStatus::Processing)
            .filter(|p| st.active.get(&p.id).is_none_or(|t| !is_live(*t)))
            .map(|p| p.id)
            .collect();

        let err = ReelError::evaluation("render was interrupted");
        for id in &stuck {
            st.active.remove(id);
            let open: Vec<TaskId> = st
                .tasks
                .iter()
                .filter(|t| t.project_id == *id && !t.status.is_terminal())
                .map(|t| t.id)
                .collect();
            for task_id in open {
                if let Some(task) = st.task_mut(task_id) {
                    task.fail(&err);
                }
            }
            if let Ok(project) = st.project_mut(*id) {
                project.status = ProjectStatus::Failed;
                project.error_message = err.to_string();
            }
            tracing::warn!(project_id = %id, "recovered project stuck in processing");
        }
        stuck
    }

    pub fn save(&self, path: &Path) -> ReelResult<()> {
        let json = serde_json::to_string_pretty(&*self.lock())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory '{}'", parent.display()))?;
        }
        std::fs::write(path, json).with_context(|| format!("write store '{}'", path.display()))?;
        Ok(())
    }

    /// Load a snapshot. Projects that were `processing` when it was written are failed, since no
    /// task survives a restart.
    pub fn load(path: &Path) -> ReelResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read store '{}'", path.display()))?;
        let state: StoreState = serde_json::from_str(&raw)?;
        let store = Self {
            state: Mutex::new(state),
        };
        store.recover_stuck(|_| false);
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::error::ErrorKind,
        timeline::{
            model::{Element, ElementId, ElementKind, Scene, TransitionSpec},
            template::{TemplateElement, TemplateScene, TemplateStructure, find_builtin},
        },
    };

    fn eligible(store: &ProjectStore) -> ProjectId {
        let id = store.create("Launch").id;
        store
            .update_draft(id, |p| {
                p.script = "Hello".into();
                p.base_media = Some("intro.mp4".into());
            })
            .unwrap();
        id
    }

    #[test]
    fn render_requires_script_and_source() {
        let store = ProjectStore::new();
        let id = store.create("Launch").id;
        assert!(store.begin_render(id).is_err());
        store.update_draft(id, |p| p.script = "Hello".into()).unwrap();
        assert!(store.begin_render(id).is_err());
        store
            .apply_template(id, &find_builtin("Promotional").unwrap())
            .unwrap();
        let task = store.begin_render(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(store.get(id).unwrap().status, ProjectStatus::Processing);
    }

    #[test]
    fn processing_projects_are_locked() {
        let store = ProjectStore::new();
        let id = eligible(&store);
        store.begin_render(id).unwrap();
        assert!(store.update_draft(id, |p| p.title = "x".into()).is_err());
        assert!(store.begin_render(id).is_err());
        assert!(
            store
                .apply_template(id, &find_builtin("Educational").unwrap())
                .is_err()
        );
    }

    #[test]
    fn invalid_template_leaves_project_untouched() {
        let store = ProjectStore::new();
        let id = eligible(&store);
        store
            .apply_template(id, &find_builtin("Promotional").unwrap())
            .unwrap();
        let before = store.get(id).unwrap();

        let bad = Template {
            structure: TemplateStructure {
                scenes: vec![TemplateScene {
                    duration: 0.0,
                    transition: TransitionSpec::none(),
                    elements: vec![TemplateElement::from(&Element::new(
                        ElementId(1),
                        ElementKind::Text,
                        "hi",
                    ))],
                }],
            },
            ..find_builtin("Promotional").unwrap()
        };
        assert!(store.apply_template(id, &bad).is_err());
        assert_eq!(store.get(id).unwrap(), before);
    }

    #[test]
    fn finishing_moves_project_to_terminal_status() {
        let store = ProjectStore::new();
        let id = eligible(&store);

        let mut task = store.begin_render(id).unwrap();
        task.start().unwrap();
        task.fail(&ReelError::encoding("ffmpeg exited"));
        store.finish(task);
        let p = store.get(id).unwrap();
        assert_eq!(p.status, ProjectStatus::Failed);
        assert!(p.error_message.contains("ffmpeg exited"));

        let mut retry = store.begin_render(id).unwrap();
        retry.start().unwrap();
        retry.complete(Some("out/a.mp4".into())).unwrap();
        let retry_id = retry.id;
        store.finish(retry);
        let p = store.get(id).unwrap();
        assert_eq!(p.status, ProjectStatus::Completed);
        assert_eq!(p.progress, 100);
        assert_eq!(store.tasks_for(id).len(), 2);
        assert_eq!(store.latest_task(id).unwrap().id, retry_id);
    }

    #[test]
    fn progress_is_monotonic_for_the_active_task_only() {
        let store = ProjectStore::new();
        let id = eligible(&store);
        let mut task = store.begin_render(id).unwrap();
        task.start().unwrap();
        task.advance(50);
        store.record_progress(&ProgressEvent::scene_boundary(&task, 1, 2));
        let mut stale = task.clone();
        stale.progress = 20;
        store.record_progress(&ProgressEvent::scene_boundary(&stale, 1, 2));
        assert_eq!(store.get(id).unwrap().progress, 50);
        assert_eq!(store.task(task.id).unwrap().status, TaskStatus::Processing);

        let mut other = task.clone();
        other.id = TaskId(99);
        other.progress = 90;
        store.record_progress(&ProgressEvent::scene_boundary(&other, 2, 2));
        assert_eq!(store.get(id).unwrap().progress, 50);
    }

    #[test]
    fn stuck_projects_are_failed_on_load() {
        let store = ProjectStore::new();
        let id = eligible(&store);
        let task = store.begin_render(id).unwrap();
        assert!(store.recover_stuck(|t| t == task.id).is_empty());

        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("target/test-store/store.json");
        store.save(&path).unwrap();
        let loaded = ProjectStore::load(&path).unwrap();
        let p = loaded.get(id).unwrap();
        assert_eq!(p.status, ProjectStatus::Failed);
        let t = loaded.task(task.id).unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.error_kind, Some(ErrorKind::Internal));
        // Retry is allowed after recovery.
        assert!(loaded.begin_render(id).is_ok());
    }

    #[test]
    fn inserted_projects_reserve_their_ids() {
        let store = ProjectStore::new();
        let mut p = Project::new(ProjectId(10), "imported");
        p.scenes.push(Scene {
            id: crate::timeline::model::SceneId(7),
            order: 0,
            duration: 1.0,
            transition: TransitionSpec::none(),
            elements: Vec::new(),
        });
        assert_eq!(store.insert(p.clone()).unwrap(), ProjectId(10));
        assert!(store.insert(p).is_err());
        assert_eq!(store.create("next").id, ProjectId(11));
    }
}
