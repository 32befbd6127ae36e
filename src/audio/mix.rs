use std::path::{Path, PathBuf};

use crate::{
    assets::media::AudioPcm,
    effects::resolve::{ClipTime, Transform},
    foundation::error::{ReelError, ReelResult},
};

/// Gain curve anchored on the project timeline: `transform` sampled over `[origin, origin + length)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub transform: Transform,
    pub origin: f64,
    pub length: f64,
}

impl Envelope {
    pub fn gain_at(&self, t: f64) -> f32 {
        self.transform.gain(ClipTime::new(t - self.origin, self.length))
    }
}

/// One piece of source audio placed on the project timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioSegment {
    pub path: PathBuf,
    pub source_start: f64,
    pub source_duration: Option<f64>,
    pub timeline_start: f64,
    pub duration: f64,
    pub volume: f32,
    pub envelopes: Vec<Envelope>,
}

impl AudioSegment {
    fn gain_at(&self, t: f64) -> f32 {
        self.envelopes
            .iter()
            .map(|e| e.gain_at(t))
            .product::<f32>()
            * self.volume
    }
}

/// Mix segments into interleaved stereo f32 covering `total_duration` seconds.
///
/// `decode` returns each segment's already-trimmed source at `sample_rate`. Segments that fail to
/// decode are skipped with a warning.
pub fn mix_segments(
    segments: &[AudioSegment],
    total_duration: f64,
    sample_rate: u32,
    mut decode: impl FnMut(&AudioSegment) -> ReelResult<AudioPcm>,
) -> Vec<f32> {
    let sr = f64::from(sample_rate);
    let total_frames = (total_duration.max(0.0) * sr).round() as usize;
    let mut out = vec![0.0f32; total_frames * 2];

    for seg in segments {
        if seg.duration <= 0.0 || seg.volume <= 0.0 {
            continue;
        }
        let pcm = match decode(seg) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::warn!(path = %seg.path.display(), error = %e, "audio segment skipped");
                continue;
            }
        };
        let channels = usize::from(pcm.channels.max(1));
        let src = &pcm.interleaved_f32;
        let src_frames = src.len() / channels;

        let start_frame = (seg.timeline_start.max(0.0) * sr).round() as usize;
        let len_frames = ((seg.duration * sr).round() as usize).min(src_frames);
        for i in 0..len_frames {
            let dst = start_frame + i;
            if dst >= total_frames {
                break;
            }
            let t = dst as f64 / sr;
            let gain = seg.gain_at(t);
            if gain == 0.0 {
                continue;
            }
            let (l, r) = if channels == 1 {
                (src[i], src[i])
            } else {
                (src[i * channels], src[i * channels + 1])
            };
            out[dst * 2] += l * gain;
            out[dst * 2 + 1] += r * gain;
        }
    }

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }
    out
}

pub fn write_mix_to_f32le_file(samples_interleaved: &[f32], out_path: &Path) -> ReelResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ReelError::encoding(format!(
                "failed to create audio mix directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut bytes = Vec::<u8>::with_capacity(samples_interleaved.len() * 4);
    for &sample in samples_interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|e| {
        ReelError::encoding(format!(
            "failed to write mixed audio '{}': {e}",
            out_path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, duration: f64, volume: f32) -> AudioSegment {
        AudioSegment {
            path: PathBuf::from("tone.wav"),
            source_start: 0.0,
            source_duration: Some(duration),
            timeline_start: start,
            duration,
            volume,
            envelopes: Vec::new(),
        }
    }

    fn constant(value: f32, frames: usize) -> AudioPcm {
        AudioPcm {
            sample_rate: 10,
            channels: 2,
            interleaved_f32: vec![value; frames * 2],
        }
    }

    #[test]
    fn segments_are_offset_and_summed() {
        let segs = [segment(0.0, 1.0, 1.0), segment(0.5, 1.0, 0.5)];
        let out = mix_segments(&segs, 2.0, 10, |_| Ok(constant(0.4, 100)));
        assert_eq!(out.len(), 40);
        assert_eq!(out[0], 0.4);
        assert!((out[6 * 2] - 0.6).abs() < 1e-6);
        assert!((out[12 * 2] - 0.2).abs() < 1e-6);
        assert_eq!(out[16 * 2], 0.0);
    }

    #[test]
    fn envelopes_ramp_and_short_sources_end_early() {
        let mut seg = segment(0.0, 1.0, 1.0);
        seg.envelopes.push(Envelope {
            transform: Transform::FadeIn { duration: 1.0 },
            origin: 0.0,
            length: 1.0,
        });
        let out = mix_segments(&[seg], 1.0, 10, |_| Ok(constant(1.0, 4)));
        assert_eq!(out[0], 0.0);
        assert!((out[2 * 2] - 0.2).abs() < 1e-6);
        assert_eq!(out[5 * 2], 0.0);
    }

    #[test]
    fn failed_decodes_are_skipped_and_output_clamped() {
        let segs = [segment(0.0, 1.0, 1.0), segment(0.0, 1.0, 1.0), segment(0.0, 1.0, 1.0)];
        let mut calls = 0;
        let out = mix_segments(&segs, 1.0, 10, |_| {
            calls += 1;
            if calls == 2 {
                Err(ReelError::media_not_found("gone"))
            } else {
                Ok(constant(0.8, 10))
            }
        });
        assert_eq!(calls, 3);
        assert_eq!(out[0], 1.0);
    }

    #[test]
    fn f32le_file_has_four_bytes_per_sample() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("target/test-mix");
        let path = dir.join("mix.f32le");
        write_mix_to_f32le_file(&[0.0, 1.0, -1.0], &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 12);
    }
}
