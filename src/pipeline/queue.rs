use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, PoisonError, mpsc},
    thread::JoinHandle,
};

use crate::{
    encode::sink::FrameSink,
    foundation::error::{ReelError, ReelResult},
    pipeline::{
        cancel::CancelToken,
        progress::{ProgressEvent, ProgressHub, ProgressTx},
        render::RenderPipeline,
        task::RenderTask,
    },
    store::ProjectStore,
    timeline::model::{ProjectId, TaskId},
};

/// Builds the sink for one task.
pub type SinkFactory = Arc<dyn Fn(&RenderTask) -> Box<dyn FrameSink> + Send + Sync>;

struct Job {
    task: RenderTask,
    cancel: CancelToken,
}

type CancelMap = Arc<Mutex<HashMap<TaskId, CancelToken>>>;

/// Front door for asynchronous renders: a fixed pool of worker threads fed over a channel.
///
/// Progress events from every worker go through one relay thread that updates the store and then
/// publishes to the [`ProgressHub`].
pub struct RenderQueue {
    jobs: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    relay: Option<JoinHandle<()>>,
    store: Arc<ProjectStore>,
    cancels: CancelMap,
}

impl RenderQueue {
    pub fn start(
        pipeline: Arc<RenderPipeline>,
        store: Arc<ProjectStore>,
        hub: Arc<ProgressHub>,
        sinks: SinkFactory,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (progress, events) = ProgressTx::channel();
        let cancels: CancelMap = Arc::default();

        let relay = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || relay_events(&events, &store, &hub))
        };

        let count = pipeline.config().workers.max(1);
        let workers = (0..count)
            .map(|n| {
                let ctx = WorkerCtx {
                    pipeline: Arc::clone(&pipeline),
                    store: Arc::clone(&store),
                    sinks: Arc::clone(&sinks),
                    progress: progress.clone(),
                    cancels: Arc::clone(&cancels),
                };
                let rx = Arc::clone(&job_rx);
                std::thread::Builder::new()
                    .name(format!("reelforge-worker-{n}"))
                    .spawn(move || worker_loop(&rx, &ctx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "failed to spawn render worker");
                    None
                }
            })
            .collect();
        tracing::info!(workers = count, "render queue started");

        Self {
            jobs: Some(job_tx),
            workers,
            relay: Some(relay),
            store,
            cancels,
        }
    }

    /// Open a task for `project` and hand it to the pool. Returns as soon as the task is queued.
    pub fn enqueue_render(&self, project: ProjectId) -> ReelResult<TaskId> {
        let task = self.store.begin_render(project)?;
        let id = task.id;
        let cancel = CancelToken::new();
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, cancel.clone());

        let sent = match &self.jobs {
            Some(tx) if !self.workers.is_empty() => tx
                .send(Job { task, cancel })
                .map_err(|mpsc::SendError(job)| job.task),
            _ => Err(task),
        };
        if let Err(mut task) = sent {
            self.cancels
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            let err = ReelError::evaluation("render queue is not accepting work");
            task.fail(&err);
            self.store.finish(task);
            return Err(err);
        }
        tracing::info!(project_id = %project, task_id = %id, "render enqueued");
        Ok(id)
    }

    /// Request cancellation; takes effect at the task's next scene boundary.
    pub fn cancel(&self, task: TaskId) -> bool {
        match self
            .cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Tasks queued or running right now.
    pub fn is_live(&self, task: TaskId) -> bool {
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&task)
    }

    /// Stop accepting work, let queued tasks finish, and join every thread.
    pub fn shutdown(mut self) {
        self.join_all();
    }

    fn join_all(&mut self) {
        drop(self.jobs.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("render worker thread panicked");
            }
        }
        if let Some(relay) = self.relay.take()
            && relay.join().is_err()
        {
            tracing::error!("progress relay thread panicked");
        }
    }
}

impl Drop for RenderQueue {
    fn drop(&mut self) {
        self.join_all();
    }
}

struct WorkerCtx {
    pipeline: Arc<RenderPipeline>,
    store: Arc<ProjectStore>,
    sinks: SinkFactory,
    progress: ProgressTx,
    cancels: CancelMap,
}

fn worker_loop(jobs: &Mutex<mpsc::Receiver<Job>>, ctx: &WorkerCtx) {
    loop {
        let next = jobs.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(job) = next else {
            return;
        };
        run_job(job, ctx);
    }
}

fn run_job(job: Job, ctx: &WorkerCtx) {
    let Job { mut task, cancel } = job;
    let task_id = task.id;

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| -> ReelResult<()> {
        let project = ctx.store.get(task.project_id)?;
        let mut sink = (ctx.sinks)(&task);
        ctx.pipeline
            .render(&project, &mut task, sink.as_mut(), &ctx.progress, &cancel)
            .map(|_| ())
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) if !task.status.is_terminal() => {
            // Failed before the pipeline took over the task; report it here.
            task.fail(&e);
            ctx.progress.send(ProgressEvent::terminal(&task));
        }
        Ok(Err(_)) => {}
        Err(_) => {
            tracing::error!(task_id = %task_id, "render worker panicked");
            task.fail(&ReelError::evaluation("render worker panicked"));
            ctx.progress.send(ProgressEvent::terminal(&task));
        }
    }

    ctx.cancels
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&task_id);
    ctx.store.finish(task);
}

fn relay_events(events: &mpsc::Receiver<ProgressEvent>, store: &ProjectStore, hub: &ProgressHub) {
    for event in events {
        store.record_progress(&event);
        hub.publish(&event);
    }
}
