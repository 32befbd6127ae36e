use crate::{
    audio::mix::AudioSegment,
    effects::resolve::{ClipTime, Transform, resolve_transition, transition_overlaps},
    foundation::{
        core::{Canvas, Fps, Rect, Rgba8Premul},
        error::ReelResult,
    },
    render::{
        frame::{FrameRGBA, RasterImage, draw_image},
        scene::SceneClip,
    },
    timeline::model::{Scene, TransitionSpec},
};

/// Where a scene sits on the project timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneSlot {
    pub offset: f64,
    pub duration: f64,
    /// Overlap with the previous scene.
    pub window: f64,
    /// Applied to this scene while it enters.
    pub transition: Transform,
}

impl SceneSlot {
    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.offset && t < self.end()
    }
}

/// Lay scenes out end to end, overlapping each with its predecessor by its transition window.
///
/// The window of scene `i` is `min(d[i], d[i-1], transition.duration)`, zero for the first scene
/// and for transitions that do not overlap.
pub fn plan_slots(scenes: &[&Scene]) -> Vec<SceneSlot> {
    let mut slots: Vec<SceneSlot> = Vec::with_capacity(scenes.len());
    let mut cursor = 0.0f64;
    for (i, scene) in scenes.iter().enumerate() {
        let duration = scene.duration.max(0.0);
        let window = match i.checked_sub(1).map(|p| scenes[p]) {
            Some(prev) if transition_overlaps(&scene.transition) => scene
                .transition
                .duration
                .max(0.0)
                .min(duration)
                .min(prev.duration.max(0.0)),
            _ => 0.0,
        };
        let transition = if window > 0.0 {
            resolve_transition(&TransitionSpec {
                duration: window,
                ..scene.transition.clone()
            })
        } else {
            Transform::Identity
        };
        let offset = (cursor - window).max(0.0);
        slots.push(SceneSlot {
            offset,
            duration,
            window,
            transition,
        });
        cursor = offset + duration;
    }
    slots
}

/// Σ durations − Σ windows.
pub fn total_duration(slots: &[SceneSlot]) -> f64 {
    slots.last().map_or(0.0, SceneSlot::end)
}

/// Composed scenes placed on the project timeline.
#[derive(Debug)]
pub struct Sequence {
    canvas: Canvas,
    fps: Fps,
    scenes: Vec<SceneClip>,
    slots: Vec<SceneSlot>,
}

impl Sequence {
    pub fn new(canvas: Canvas, fps: Fps, scenes: Vec<SceneClip>, slots: Vec<SceneSlot>) -> Self {
        debug_assert_eq!(scenes.len(), slots.len());
        Self {
            canvas,
            fps,
            scenes,
            slots,
        }
    }

    pub fn fps(&self) -> Fps {
        self.fps
    }

    pub fn slots(&self) -> &[SceneSlot] {
        &self.slots
    }

    pub fn scenes(&self) -> &[SceneClip] {
        &self.scenes
    }

    pub fn total_duration(&self) -> f64 {
        total_duration(&self.slots)
    }

    pub fn frame_count(&self) -> u64 {
        self.fps.secs_to_frames_round(self.total_duration())
    }

    /// Render project time `t`: each active scene in order, later ones drawn over earlier ones
    /// through their entering transition.
    pub fn render_frame(&mut self, t: f64) -> ReelResult<FrameRGBA> {
        let full = Rect::new(
            0.0,
            0.0,
            f64::from(self.canvas.width),
            f64::from(self.canvas.height),
        );
        let mut out: Option<FrameRGBA> = None;

        for (slot, scene) in self.slots.iter().zip(self.scenes.iter_mut()) {
            if t >= slot.end() {
                scene.finish();
                continue;
            }
            if !slot.contains(t) {
                continue;
            }
            let local = t - slot.offset;
            let frame = scene.render_frame(local)?;
            out = Some(match out {
                None => frame,
                Some(mut below) => {
                    let ct = ClipTime::new(local, slot.duration);
                    let opacity = slot.transition.opacity(ct);
                    let dest = slot.transition.place(ct, full, self.canvas);
                    draw_image(&mut below, &RasterImage::from_frame(frame), dest, opacity);
                    below
                }
            });
        }

        // Past the last scene (rounding at the tail): hold the final scene's last instant.
        match out {
            Some(frame) => Ok(frame),
            None => match (self.slots.last(), self.scenes.last_mut()) {
                (Some(slot), Some(scene)) => {
                    scene.render_frame((slot.duration - self.fps.frame_duration_secs()).max(0.0))
                }
                _ => Ok(FrameRGBA::solid(self.canvas, Rgba8Premul::transparent())),
            },
        }
    }

    /// Audio of all scenes on the project timeline; entering transitions also ramp the audio.
    pub fn audio_segments(&self) -> Vec<AudioSegment> {
        self.slots
            .iter()
            .zip(&self.scenes)
            .flat_map(|(slot, scene)| scene.audio_segments(slot.offset, &slot.transition))
            .collect()
    }

    pub fn finish(&mut self) {
        for scene in &mut self.scenes {
            scene.finish();
        }
    }
}
