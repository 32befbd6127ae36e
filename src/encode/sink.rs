use std::path::PathBuf;

use crate::{
    foundation::{
        core::{Fps, FrameIndex, Rgba8Premul},
        error::ReelResult,
    },
    render::frame::FrameRGBA,
};

/// Configuration handed to a [`FrameSink`] before the first frame.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    /// Mixed soundtrack, when the timeline has any audio.
    pub audio: Option<AudioInputConfig>,
    /// Where a file-producing sink writes its artifact.
    pub out_path: PathBuf,
    /// Opaque colour that translucent pixels are flattened over.
    pub background: Rgba8Premul,
}

/// Raw PCM input for sinks that encode audio.
#[derive(Debug, Clone)]
pub struct AudioInputConfig {
    /// Interleaved `f32le` samples.
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Consumer of rendered frames in timeline order.
///
/// `push_frame` is called with strictly increasing indices between one `begin` and one `end`.
/// `abort` replaces `end` when the render stops early.
pub trait FrameSink: Send {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()>;
    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()>;
    /// Finish the stream; returns the written artifact, if the sink writes one.
    fn end(&mut self) -> ReelResult<Option<PathBuf>>;
    fn abort(&mut self) {}
}

/// Keeps frames in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, FrameRGBA)>,
    keep_frames: bool,
    pushed: u64,
    finished: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self {
            keep_frames: true,
            ..Self::default()
        }
    }

    /// Count frames without retaining their pixels.
    pub fn counting() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    pub fn frames(&self) -> &[(FrameIndex, FrameRGBA)] {
        &self.frames
    }

    pub fn frame_count(&self) -> u64 {
        self.pushed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.pushed = 0;
        self.finished = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        if self.keep_frames {
            self.frames.push((idx, frame.clone()));
        }
        self.pushed += 1;
        Ok(())
    }

    fn end(&mut self) -> ReelResult<Option<PathBuf>> {
        self.finished = true;
        Ok(None)
    }
}
