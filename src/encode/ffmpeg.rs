use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
    thread::JoinHandle,
};

use crate::{
    assets::media::ffmpeg_available,
    encode::sink::{FrameSink, SinkConfig},
    foundation::{
        core::{Fps, FrameIndex},
        error::{ReelError, ReelResult},
    },
    render::frame::{FrameRGBA, flatten_to_opaque_rgba8},
};

/// Streams raw RGBA frames into a system `ffmpeg`, producing H.264 (yuv420p) with AAC audio.
#[derive(Default)]
pub struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        self.cfg = None;
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ReelError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "ffmpeg sink width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        ensure_parent_dir(&cfg.out_path)?;
        if !ffmpeg_available() {
            return Err(ReelError::encoding(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
        ]);
        push_input_fps(&mut cmd, cfg.fps);
        cmd.args(["-i", "pipe:0"]);

        if let Some(audio) = cfg.audio.as_ref() {
            if audio.sample_rate == 0 || audio.channels == 0 {
                return Err(ReelError::validation(
                    "audio sample_rate/channels must be non-zero when audio is enabled",
                ));
            }
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path)
            .args(["-c:a", "aac", "-b:a", "192k"]);
        } else {
            cmd.arg("-an");
        }
        cmd.args([
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]);
        cmd.arg(&cfg.out_path);

        tracing::debug!(out = %cfg.out_path.display(), audio = cfg.audio.is_some(), "spawning ffmpeg");
        let mut child = cmd
            .spawn()
            .map_err(|e| ReelError::encoding(format!("failed to spawn ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::encoding("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::encoding("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelError::encoding("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(ReelError::encoding(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ReelError::encoding(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        self.last_idx = Some(idx);

        let opaque = flatten_to_opaque_rgba8(frame, cfg.background)?;
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::encoding("ffmpeg sink is already finalized"));
        };
        stdin
            .write_all(&opaque)
            .map_err(|e| ReelError::encoding(format!("failed to write frame to ffmpeg: {e}")))
    }

    fn end(&mut self) -> ReelResult<Option<PathBuf>> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReelError::encoding("ffmpeg sink not started"))?;
        let status = child
            .wait()
            .map_err(|e| ReelError::encoding(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelError::encoding("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelError::encoding(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        let cfg = self.cfg.take();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReelError::encoding(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }
        Ok(cfg.map(|c| c.out_path))
    }

    fn abort(&mut self) {
        self.kill();
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.kill();
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // `-r` before `-i` sets the rawvideo input rate.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ReelError::encoding(format!(
                "failed to create output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encode::sink::AudioInputConfig,
        foundation::core::{Canvas, Rgba8Premul},
    };

    fn cfg(out: PathBuf, width: u32) -> SinkConfig {
        SinkConfig {
            width,
            height: 16,
            fps: Fps::new(10, 1).unwrap(),
            audio: None,
            out_path: out,
            background: Rgba8Premul::from_straight_rgba(0, 0, 0, 255),
        }
    }

    fn out_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("target/test-ffmpeg-sink")
    }

    #[test]
    fn odd_dimensions_are_rejected() {
        let mut sink = FfmpegSink::new();
        let err = sink.begin(cfg(out_dir().join("odd.mp4"), 15)).unwrap_err();
        assert!(err.to_string().contains("even"));
    }

    #[test]
    fn push_before_begin_fails() {
        let mut sink = FfmpegSink::new();
        let frame = FrameRGBA::solid(Canvas::new(16, 16), Rgba8Premul::transparent());
        assert!(sink.push_frame(FrameIndex(0), &frame).is_err());
    }

    #[test]
    fn encodes_mp4_with_audio() {
        if !ffmpeg_available() {
            eprintln!("skipping: ffmpeg not on PATH");
            return;
        }
        let dir = out_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let pcm = dir.join("tone.f32le");
        let samples: Vec<u8> = (0..4800 * 2)
            .flat_map(|i| ((i as f32 * 0.01).sin() * 0.2).to_le_bytes())
            .collect();
        std::fs::write(&pcm, samples).unwrap();

        let out = dir.join("clip.mp4");
        let mut c = cfg(out.clone(), 16);
        c.audio = Some(AudioInputConfig {
            path: pcm,
            sample_rate: 48_000,
            channels: 2,
        });
        let mut sink = FfmpegSink::new();
        sink.begin(c).unwrap();
        let frame = FrameRGBA::solid(
            Canvas::new(16, 16),
            Rgba8Premul::from_straight_rgba(255, 0, 0, 128),
        );
        for i in 0..5 {
            sink.push_frame(FrameIndex(i), &frame).unwrap();
        }
        assert!(sink.push_frame(FrameIndex(2), &frame).is_err());
        assert_eq!(sink.end().unwrap(), Some(out.clone()));
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
    }
}
