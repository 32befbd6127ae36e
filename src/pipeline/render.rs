use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    assets::{media::decode_audio_f32_stereo, source::MediaResolver, text::TextRasterizer},
    audio::mix::{mix_segments, write_mix_to_f32le_file},
    config::EngineConfig,
    encode::sink::{AudioInputConfig, FrameSink, SinkConfig},
    foundation::{
        core::FrameIndex,
        error::{ReelError, ReelResult},
    },
    pipeline::{
        cancel::CancelToken,
        progress::{ProgressEvent, ProgressTx},
        scratch::TaskScratch,
        task::RenderTask,
    },
    render::{
        element::ElementContext,
        scene::{SceneClip, compose_scene},
        sequence::{Sequence, plan_slots},
    },
    services::{NoSpeech, SpeechSynthesizer},
    timeline::{
        model::Project,
        validate::{validate_project, violations_to_error},
    },
};

/// What a finished render produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOutcome {
    /// Final artifact in the output directory; `None` for sinks that write no file.
    pub output: Option<PathBuf>,
    pub duration: f64,
    pub frames: u64,
}

/// Drives one render task from validation to the stored artifact.
///
/// Collaborators are injected at construction; the pipeline itself holds no global state and runs
/// synchronously on the caller's thread.
pub struct RenderPipeline {
    config: EngineConfig,
    media: MediaResolver,
    text: TextRasterizer,
    speech: Arc<dyn SpeechSynthesizer>,
}

impl RenderPipeline {
    pub fn new(config: EngineConfig) -> ReelResult<Self> {
        config.validate()?;
        let media = MediaResolver::new(config.media_root.clone());
        let text = TextRasterizer::new(config.fonts_dir.as_deref());
        Ok(Self {
            config,
            media,
            text,
            speech: Arc::new(NoSpeech),
        })
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_media_resolver(mut self, media: MediaResolver) -> Self {
        self.media = media;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `task` for `project`, streaming frames into `sink`.
    ///
    /// The task always ends `completed` or `failed`, and exactly one terminal event is sent after
    /// the per-scene boundary events.
    pub fn render(
        &self,
        project: &Project,
        task: &mut RenderTask,
        sink: &mut dyn FrameSink,
        progress: &ProgressTx,
        cancel: &CancelToken,
    ) -> ReelResult<RenderOutcome> {
        let span = tracing::info_span!("render", project_id = %project.id, task_id = %task.id);
        let _enter = span.enter();

        task.start()?;
        tracing::info!(scenes = project.scenes.len(), "render started");

        let result = self.run(project, task, sink, progress, cancel);
        match &result {
            Ok(outcome) => {
                task.complete(outcome.output.clone())?;
                tracing::info!(
                    frames = outcome.frames,
                    duration = outcome.duration,
                    output = ?outcome.output,
                    "render completed"
                );
            }
            Err(e) => {
                task.fail(e);
                tracing::warn!(error_kind = ?e.kind(), error = %e, "render failed");
            }
        }
        progress.send(ProgressEvent::terminal(task));
        result
    }

    fn run(
        &self,
        project: &Project,
        task: &mut RenderTask,
        sink: &mut dyn FrameSink,
        progress: &ProgressTx,
        cancel: &CancelToken,
    ) -> ReelResult<RenderOutcome> {
        let violations = validate_project(project);
        if !violations.is_empty() {
            return Err(violations_to_error(&violations));
        }
        let ordered = project.ordered_scenes();
        if ordered.is_empty() {
            return Err(ReelError::validation("project has no scenes"));
        }
        cancel.check()?;

        let cfg = &self.config;
        let scratch = TaskScratch::create(&cfg.work_dir, task.id)?;
        let background = cfg.background_premul();

        let scenes: Vec<SceneClip> = ordered
            .iter()
            .map(|scene| {
                let ctx = ElementContext {
                    canvas: cfg.canvas,
                    scene_duration: scene.duration,
                    media: &self.media,
                    text: &self.text,
                    text_style: &cfg.text,
                    text_size_px: cfg.text_size_px(),
                    speech: self.speech.as_ref(),
                    scratch: scratch.path(),
                };
                compose_scene(scene, &ctx, cfg.fps, background)
            })
            .collect();
        check_content(&scenes)?;

        let slots = plan_slots(&ordered);
        let mut sequence = Sequence::new(cfg.canvas, cfg.fps, scenes, slots);
        let total = sequence.total_duration();
        let frames = sequence.frame_count();
        if frames == 0 {
            return Err(ReelError::validation("timeline is shorter than one frame"));
        }

        let audio = self.mix_audio(&sequence, total, &scratch)?;
        sink.begin(SinkConfig {
            width: cfg.canvas.width,
            height: cfg.canvas.height,
            fps: cfg.fps,
            audio,
            out_path: scratch.join("render.mp4"),
            background,
        })?;

        if let Err(e) = stream_frames(&mut sequence, frames, task, sink, progress, cancel) {
            sink.abort();
            sequence.finish();
            return Err(e);
        }
        sequence.finish();
        let written = sink.end()?;

        let output = match written {
            Some(path) => Some(persist_artifact(
                &path,
                &cfg.output_dir,
                &format!("project_{}_task_{}.mp4", project.id, task.id),
            )?),
            None => None,
        };
        Ok(RenderOutcome {
            output,
            duration: total,
            frames,
        })
    }

    fn mix_audio(
        &self,
        sequence: &Sequence,
        total: f64,
        scratch: &TaskScratch,
    ) -> ReelResult<Option<AudioInputConfig>> {
        let segments = sequence.audio_segments();
        if segments.is_empty() {
            return Ok(None);
        }
        let sample_rate = self.config.audio_sample_rate;
        let mixed = mix_segments(&segments, total, sample_rate, |seg| {
            decode_audio_f32_stereo(&seg.path, sample_rate, seg.source_start, seg.source_duration)
        });
        let path = scratch.join("mix.f32le");
        write_mix_to_f32le_file(&mixed, &path)?;
        tracing::debug!(segments = segments.len(), "audio mixed");
        Ok(Some(AudioInputConfig {
            path,
            sample_rate,
            channels: 2,
        }))
    }
}

/// Fail when every declared element across the project failed to render.
///
/// A project whose only element fails still renders, as a blank placeholder.
fn check_content(scenes: &[SceneClip]) -> ReelResult<()> {
    let declared: usize = scenes.iter().map(|s| s.declared).sum();
    let failed: usize = scenes.iter().map(|s| s.failed).sum();
    if declared >= 2 && failed == declared {
        return Err(ReelError::content_loss(format!(
            "all {failed} elements failed to render"
        )));
    }
    Ok(())
}

/// Push every frame in order. Each time the stream passes a scene's end, one progress event is
/// sent and cancellation is checked.
fn stream_frames(
    sequence: &mut Sequence,
    frames: u64,
    task: &mut RenderTask,
    sink: &mut dyn FrameSink,
    progress: &ProgressTx,
    cancel: &CancelToken,
) -> ReelResult<()> {
    let ends: Vec<f64> = sequence.slots().iter().map(|s| s.end()).collect();
    let total = ends.len();
    let fps = sequence.fps();
    let mut crossed = 0usize;

    let boundary = |crossed: usize, task: &mut RenderTask| -> ReelResult<()> {
        task.advance((crossed * 100 / total) as u8);
        progress.send(ProgressEvent::scene_boundary(task, crossed, total));
        cancel.check()
    };

    for f in 0..frames {
        let t = fps.frames_to_secs(f);
        while crossed < total && t >= ends[crossed] {
            crossed += 1;
            boundary(crossed, &mut *task)?;
        }
        let frame = sequence.render_frame(t)?;
        sink.push_frame(FrameIndex(f), &frame)?;
    }
    while crossed < total {
        crossed += 1;
        boundary(crossed, &mut *task)?;
    }
    Ok(())
}

/// Move a finished artifact out of scratch. Falls back to copy when rename crosses filesystems.
fn persist_artifact(src: &Path, output_dir: &Path, name: &str) -> ReelResult<PathBuf> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        ReelError::encoding(format!(
            "failed to create output directory '{}': {e}",
            output_dir.display()
        ))
    })?;
    let dest = output_dir.join(name);
    if std::fs::rename(src, &dest).is_err() {
        std::fs::copy(src, &dest).map_err(|e| {
            ReelError::encoding(format!(
                "failed to store artifact '{}': {e}",
                dest.display()
            ))
        })?;
    }
    Ok(dest)
}
