//! reelforge assembles short videos from templated scenes.
//!
//! A [`Project`] holds ordered [`Scene`]s of timed [`Element`]s. The [`RenderPipeline`] validates
//! the timeline, composes every scene on the CPU, joins scenes through their transitions and
//! streams the frames into a [`FrameSink`] (an ffmpeg MP4 encoder in production). The
//! [`ProjectStore`] and [`RenderQueue`] wrap that in an asynchronous task lifecycle with progress
//! events.
#![forbid(unsafe_code)]

mod assets;
mod foundation;

pub(crate) mod audio;
pub(crate) mod config;
pub(crate) mod effects;
pub(crate) mod encode;
pub(crate) mod pipeline;
pub(crate) mod render;
pub(crate) mod services;
pub(crate) mod store;
pub(crate) mod timeline;

pub use crate::foundation::core::{Canvas, Fps, FrameIndex, Point, Rect, Rgba8Premul, Vec2};
pub use crate::foundation::error::{ErrorKind, ReelError, ReelResult};

pub use crate::assets::media::{MediaInfo, ffmpeg_available, probe_media};
pub use crate::assets::source::MediaResolver;
pub use crate::assets::text::TextRasterizer;
pub use crate::config::{EngineConfig, TextStyle};
pub use crate::effects::params::{
    Effect, SlideDirection, SlideMode, TransitionKind, parse_effect, parse_transition,
};
pub use crate::effects::resolve::{
    ClipTime, Transform, resolve_effect, resolve_effects, resolve_transition, transition_overlaps,
};
pub use crate::encode::ffmpeg::FfmpegSink;
pub use crate::encode::sink::{AudioInputConfig, FrameSink, InMemorySink, SinkConfig};
pub use crate::pipeline::cancel::CancelToken;
pub use crate::pipeline::progress::{ProgressEvent, ProgressHub, ProgressTx};
pub use crate::pipeline::queue::{RenderQueue, SinkFactory};
pub use crate::pipeline::render::{RenderOutcome, RenderPipeline};
pub use crate::pipeline::task::{RenderTask, TaskStatus};
pub use crate::render::clip::TimedClip;
pub use crate::render::element::{ElementContext, Renderable, render_element};
pub use crate::render::frame::FrameRGBA;
pub use crate::render::scene::{SceneClip, compose_scene};
pub use crate::render::sequence::{SceneSlot, Sequence, plan_slots, total_duration};
pub use crate::services::{
    CommandSpeech, NoSpeech, OutlineScriptWriter, SpeechAudio, SpeechRequest, SpeechSynthesizer,
    TextGenerator, TextPurpose, TextRequest, fill_missing_script,
};
pub use crate::store::ProjectStore;
pub use crate::timeline::model::{
    EffectSpec, Element, ElementId, ElementKind, Narration, Position, Project, ProjectId,
    ProjectStatus, Scene, SceneId, Size, SourceTrim, TaskId, TransitionSpec,
};
pub use crate::timeline::template::{
    IdAllocator, Template, TemplateElement, TemplateScene, TemplateStructure, builtin_templates,
    educational_template, effect_preset, find_builtin, promotional_template, transition_preset,
};
pub use crate::timeline::validate::{
    EntityRef, ValidationError, validate_project, violations_to_error,
};
