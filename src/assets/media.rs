use std::{
    io::{BufReader, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
};

use crate::{
    assets::decode::premultiply_rgba8_in_place,
    foundation::{
        core::Fps,
        error::{ReelError, ReelResult},
    },
    render::frame::RasterImage,
};

#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// `(width, height)` of the first video stream, if any.
    pub video: Option<(u32, u32)>,
    pub has_audio: bool,
    pub duration_sec: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    pub fn frames(&self) -> usize {
        self.interleaved_f32.len() / usize::from(self.channels.max(1))
    }
}

/// Whether `ffmpeg` and `ffprobe` can be spawned.
pub fn ffmpeg_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|bin| {
        Command::new(bin)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    })
}

/// Probe a media file with `ffprobe`. Anything ffprobe cannot read is [`ReelError::MediaNotFound`].
pub fn probe_media(path: &Path) -> ReelResult<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| ReelError::media_not_found(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ReelError::media_not_found(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ReelError::media_not_found(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| Some((s.width?, s.height?)));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaInfo {
        path: path.to_path_buf(),
        video,
        has_audio,
        duration_sec,
    })
}

/// Decode `[start, start + duration)` of a file's audio to interleaved f32 stereo.
pub fn decode_audio_f32_stereo(
    path: &Path,
    sample_rate: u32,
    start: f64,
    duration: Option<f64>,
) -> ReelResult<AudioPcm> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-nostdin"]);
    if start > 0.0 {
        cmd.args(["-ss", &format!("{start:.6}")]);
    }
    cmd.arg("-i").arg(path);
    if let Some(d) = duration {
        cmd.args(["-t", &format!("{:.6}", d.max(0.0))]);
    }
    let out = cmd
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| ReelError::media_not_found(format!("failed to run ffmpeg: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        // No audio stream is an empty track, not a failure.
        if msg.contains("matches no streams")
            || msg.contains("Output file #0 does not contain any stream")
            || msg.contains("does not contain any stream")
        {
            return Ok(AudioPcm {
                sample_rate,
                channels: 2,
                interleaved_f32: Vec::new(),
            });
        }
        return Err(ReelError::media_not_found(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(ReelError::evaluation(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let pcm = out
        .stdout
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: pcm,
    })
}

/// Sequential frame reader over an `ffmpeg` child that scales to a fixed box and resamples to the
/// output frame rate. Past the end of the source the last frame is held.
pub struct VideoFeed {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Child,
    stdout: BufReader<ChildStdout>,
    /// Index of the frame held in `current`.
    current_index: Option<u64>,
    current: Option<RasterImage>,
    exhausted: bool,
}

impl std::fmt::Debug for VideoFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFeed")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("current_index", &self.current_index)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl VideoFeed {
    pub fn open(
        path: &Path,
        width: u32,
        height: u32,
        fps: Fps,
        source_start: f64,
        source_duration: Option<f64>,
    ) -> ReelResult<Self> {
        if width == 0 || height == 0 {
            return Err(ReelError::evaluation("video box must be non-empty"));
        }
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-nostdin"]);
        if source_start > 0.0 {
            cmd.args(["-ss", &format!("{source_start:.6}")]);
        }
        cmd.arg("-i").arg(path);
        if let Some(d) = source_duration {
            cmd.args(["-t", &format!("{:.6}", d.max(0.0))]);
        }
        cmd.args([
            "-an",
            "-vf",
            &format!("scale={width}:{height},fps={}/{}", fps.num, fps.den),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| ReelError::media_not_found(format!("failed to spawn ffmpeg: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::evaluation("ffmpeg stdout not captured"))?;

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            child,
            stdout: BufReader::new(stdout),
            current_index: None,
            current: None,
            exhausted: false,
        })
    }

    /// Frame `index` (at the output rate, from the source start). Frames must be requested in
    /// non-decreasing order. `None` only if the source yielded no frames at all.
    pub fn frame_at(&mut self, index: u64) -> ReelResult<Option<&RasterImage>> {
        while !self.exhausted && self.current_index.is_none_or(|cur| cur < index) {
            match self.read_frame()? {
                Some(frame) => {
                    self.current = Some(frame);
                    self.current_index = Some(self.current_index.map_or(0, |i| i + 1));
                }
                None => {
                    self.exhausted = true;
                    tracing::debug!(
                        path = %self.path.display(),
                        frames = self.current_index.map_or(0, |i| i + 1),
                        "video source exhausted, holding last frame"
                    );
                }
            }
        }
        Ok(self.current.as_ref())
    }

    fn read_frame(&mut self) -> ReelResult<Option<RasterImage>> {
        let len = self.width as usize * self.height as usize * 4;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self
                .stdout
                .read(&mut buf[filled..])
                .map_err(|e| ReelError::media_not_found(format!("read video frames: {e}")))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled < len {
            return Ok(None);
        }
        premultiply_rgba8_in_place(&mut buf);
        Ok(Some(RasterImage::new(self.width, self.height, buf)?))
    }
}

impl Drop for VideoFeed {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_dir() -> PathBuf {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("target/test-media");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn make_test_video(path: &Path) -> bool {
        Command::new("ffmpeg")
            .args([
                "-v",
                "error",
                "-y",
                "-f",
                "lavfi",
                "-i",
                "color=c=red:s=32x16:d=0.5:r=10",
                "-f",
                "lavfi",
                "-i",
                "sine=frequency=440:duration=0.5",
                "-shortest",
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(path)
            .status()
            .is_ok_and(|s| s.success())
    }

    #[test]
    fn probe_missing_file_is_media_not_found() {
        let err = probe_media(&fixture_dir().join("nope.mp4")).unwrap_err();
        assert!(matches!(err, ReelError::MediaNotFound(_)));
    }

    #[test]
    fn video_feed_reads_then_holds_last_frame() {
        if !ffmpeg_available() {
            return;
        }
        let path = fixture_dir().join("red.mp4");
        if !make_test_video(&path) {
            return;
        }
        let info = probe_media(&path).unwrap();
        assert_eq!(info.video, Some((32, 16)));
        assert!(info.has_audio);

        let mut feed = VideoFeed::open(&path, 8, 4, Fps::new(10, 1).unwrap(), 0.0, None).unwrap();
        let first = feed.frame_at(0).unwrap().unwrap().clone();
        assert_eq!((first.width, first.height), (8, 4));
        assert!(first.pixels[0] > 200 && first.pixels[3] == 255);
        // Far past the 5-frame source: still a frame.
        assert!(feed.frame_at(50).unwrap().is_some());

        let pcm = decode_audio_f32_stereo(&path, 8_000, 0.0, Some(0.25)).unwrap();
        assert_eq!(pcm.channels, 2);
        assert!(pcm.frames() > 1_000 && pcm.frames() <= 2_100);
    }
}
