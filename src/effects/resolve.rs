use crate::{
    effects::{
        blur::blur_radius,
        params::{
            Effect, SlideDirection, SlideMode, TransitionKind, parse_effect, parse_transition,
        },
        pixel,
    },
    foundation::{
        core::{Canvas, Rect, Vec2},
        error::ReelResult,
        math::{lerp, ramp},
    },
    render::clip::TimedClip,
    timeline::model::{EffectSpec, TransitionSpec},
};

/// Time context of a clip being sampled: seconds since the clip started, and its full length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipTime {
    pub local: f64,
    pub length: f64,
}

impl ClipTime {
    pub fn new(local: f64, length: f64) -> Self {
        Self {
            local,
            length: length.max(0.0),
        }
    }
}

/// A resolved effect or transition: a pure function of (clip, time) to a modified clip.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    Identity,
    Blur {
        radius: f32,
    },
    Brightness {
        factor: f32,
    },
    Contrast {
        factor: f32,
    },
    Grayscale,
    FadeIn {
        duration: f64,
    },
    FadeOut {
        duration: f64,
    },
    Slide {
        direction: SlideDirection,
        duration: f64,
        mode: SlideMode,
    },
    Zoom {
        from: f64,
        to: f64,
        duration: f64,
    },
    Compose(Vec<Transform>),
}

impl Transform {
    /// Sequential composition, dropping identities.
    pub fn compose(parts: impl IntoIterator<Item = Transform>) -> Transform {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Transform::Identity => {}
                Transform::Compose(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Transform::Identity,
            1 => flat.remove(0),
            _ => Transform::Compose(flat),
        }
    }

    pub fn is_identity(&self) -> bool {
        match self {
            Transform::Identity => true,
            Transform::Compose(parts) => parts.iter().all(Transform::is_identity),
            _ => false,
        }
    }

    /// Append this transform to the clip's chain.
    pub fn apply(self, mut clip: TimedClip) -> TimedClip {
        if !self.is_identity() {
            clip.transforms.push(self);
        }
        clip
    }

    /// Whether this transform rewrites pixels (as opposed to opacity or placement).
    pub fn touches_pixels(&self) -> bool {
        match self {
            Transform::Blur { .. }
            | Transform::Brightness { .. }
            | Transform::Contrast { .. }
            | Transform::Grayscale => true,
            Transform::Compose(parts) => parts.iter().any(Transform::touches_pixels),
            _ => false,
        }
    }

    /// Opacity multiplier at `ct`. Fades are clamped to the clip length.
    pub fn opacity(&self, ct: ClipTime) -> f32 {
        match self {
            Transform::FadeIn { duration } => ramp(ct.local, duration.min(ct.length)) as f32,
            Transform::FadeOut { duration } => {
                ramp(ct.length - ct.local, duration.min(ct.length)) as f32
            }
            Transform::Compose(parts) => parts.iter().map(|p| p.opacity(ct)).product(),
            _ => 1.0,
        }
    }

    /// Volume multiplier at `ct`; fades ramp audio the same way they ramp opacity.
    pub fn gain(&self, ct: ClipTime) -> f32 {
        self.opacity(ct)
    }

    /// Destination rectangle at `ct` for content whose resting placement is `rect`.
    pub fn place(&self, ct: ClipTime, rect: Rect, canvas: Canvas) -> Rect {
        match self {
            Transform::Slide {
                direction,
                duration,
                mode,
            } => {
                let span = duration.min(ct.length);
                let canvas_w = f64::from(canvas.width);
                let from_right = canvas_w - rect.x0;
                let past_left = -rect.x1;
                let dx = match (mode, direction) {
                    (SlideMode::Enter, SlideDirection::Left) => {
                        from_right * (1.0 - ramp(ct.local, span))
                    }
                    (SlideMode::Enter, SlideDirection::Right) => {
                        past_left * (1.0 - ramp(ct.local, span))
                    }
                    (SlideMode::Exit, SlideDirection::Left) => {
                        past_left * exit_progress(ct, span)
                    }
                    (SlideMode::Exit, SlideDirection::Right) => {
                        from_right * exit_progress(ct, span)
                    }
                };
                rect + Vec2::new(dx, 0.0)
            }
            Transform::Zoom { from, to, duration } => {
                let s = lerp(*from, *to, ramp(ct.local, *duration));
                let c = rect.center();
                let half = Vec2::new(rect.width() * s / 2.0, rect.height() * s / 2.0);
                Rect::new(c.x - half.x, c.y - half.y, c.x + half.x, c.y + half.y)
            }
            Transform::Compose(parts) => parts
                .iter()
                .fold(rect, |r, part| part.place(ct, r, canvas)),
            _ => rect,
        }
    }

    /// Run the pixel kernels of this transform over a premultiplied RGBA8 buffer.
    pub fn apply_pixels(&self, px: &mut Vec<u8>, width: u32, height: u32) -> ReelResult<()> {
        match self {
            Transform::Blur { radius } => {
                *px = blur_radius(px, width, height, *radius)?;
            }
            Transform::Brightness { factor } => pixel::brightness_in_place(px, *factor),
            Transform::Contrast { factor } => pixel::contrast_in_place(px, *factor),
            Transform::Grayscale => pixel::grayscale_in_place(px),
            Transform::Compose(parts) => {
                for part in parts {
                    part.apply_pixels(px, width, height)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn exit_progress(ct: ClipTime, span: f64) -> f64 {
    if span <= 0.0 {
        return if ct.local >= ct.length { 1.0 } else { 0.0 };
    }
    ramp(ct.local - (ct.length - span), span)
}

impl From<Effect> for Transform {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Blur { radius } if radius <= 0.0 => Transform::Identity,
            Effect::Blur { radius } => Transform::Blur { radius },
            Effect::Brightness { factor } => Transform::Brightness { factor },
            Effect::Contrast { factor } => Transform::Contrast { factor },
            Effect::Grayscale => Transform::Grayscale,
            Effect::FadeIn { duration } => Transform::FadeIn { duration },
            Effect::FadeOut { duration } => Transform::FadeOut { duration },
            Effect::Slide {
                direction,
                duration,
                mode,
            } => Transform::Slide {
                direction,
                duration,
                mode,
            },
            Effect::Zoom { scale, duration } => Transform::Zoom {
                from: 1.0,
                to: scale,
                duration,
            },
        }
    }
}

/// Resolve one effect descriptor. Unknown or malformed descriptors resolve to identity.
pub fn resolve_effect(spec: &EffectSpec) -> Transform {
    match parse_effect(spec) {
        Ok(Some(effect)) => effect.into(),
        Ok(None) => {
            tracing::warn!(effect = %spec.kind, "unknown effect type ignored");
            Transform::Identity
        }
        Err(e) => {
            tracing::warn!(effect = %spec.kind, error = %e, "malformed effect ignored");
            Transform::Identity
        }
    }
}

/// Resolve an ordered effect list into one composed transform.
pub fn resolve_effects(specs: &[EffectSpec]) -> Transform {
    Transform::compose(specs.iter().map(resolve_effect))
}

/// Resolve a transition into the transform applied to the incoming scene over `spec.duration`.
pub fn resolve_transition(spec: &TransitionSpec) -> Transform {
    let duration = spec.duration.max(0.0);
    match parse_transition(spec) {
        Ok(Some(TransitionKind::None)) => Transform::Identity,
        Ok(Some(TransitionKind::Fade)) => Transform::FadeIn { duration },
        Ok(Some(TransitionKind::Slide { direction })) => Transform::Slide {
            direction,
            duration,
            mode: SlideMode::Enter,
        },
        Ok(Some(TransitionKind::Zoom { scale })) => Transform::compose([
            Transform::Zoom {
                from: scale,
                to: 1.0,
                duration,
            },
            Transform::FadeIn { duration },
        ]),
        Ok(None) => {
            tracing::warn!(transition = %spec.kind, "unknown transition type ignored");
            Transform::Identity
        }
        Err(e) => {
            tracing::warn!(transition = %spec.kind, error = %e, "malformed transition ignored");
            Transform::Identity
        }
    }
}

/// Whether the transition overlaps the incoming scene with the outgoing one.
pub fn transition_overlaps(spec: &TransitionSpec) -> bool {
    matches!(
        parse_transition(spec),
        Ok(Some(
            TransitionKind::Fade | TransitionKind::Slide { .. } | TransitionKind::Zoom { .. }
        ))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_effect_resolves_to_identity() {
        let t = resolve_effect(&EffectSpec::new("sparkle", json!({})));
        assert!(t.is_identity());
        let t = resolve_effect(&EffectSpec::new("blur", json!({"radius": 0})));
        assert!(t.is_identity());
    }

    #[test]
    fn effects_compose_in_list_order() {
        let t = resolve_effects(&[
            EffectSpec::new("grayscale", serde_json::Value::Null),
            EffectSpec::new("nope", serde_json::Value::Null),
            EffectSpec::new("fade_in", json!({"duration": 2.0})),
        ]);
        assert_eq!(
            t,
            Transform::Compose(vec![
                Transform::Grayscale,
                Transform::FadeIn { duration: 2.0 }
            ])
        );
        assert!(t.touches_pixels());
    }

    #[test]
    fn fades_ramp_and_clamp_to_clip_length() {
        let fade_in = Transform::FadeIn { duration: 2.0 };
        assert_eq!(fade_in.opacity(ClipTime::new(0.0, 10.0)), 0.0);
        assert_eq!(fade_in.opacity(ClipTime::new(1.0, 10.0)), 0.5);
        assert_eq!(fade_in.opacity(ClipTime::new(3.0, 10.0)), 1.0);
        // A 2s fade on a 1s clip completes within the clip.
        assert_eq!(fade_in.opacity(ClipTime::new(0.5, 1.0)), 0.5);

        let fade_out = Transform::FadeOut { duration: 2.0 };
        assert_eq!(fade_out.opacity(ClipTime::new(0.0, 10.0)), 1.0);
        assert_eq!(fade_out.opacity(ClipTime::new(9.0, 10.0)), 0.5);
        assert_eq!(fade_out.gain(ClipTime::new(10.0, 10.0)), 0.0);
    }

    #[test]
    fn slide_left_enters_from_right_edge() {
        let canvas = Canvas::new(100, 50);
        let rect = Rect::new(10.0, 0.0, 30.0, 10.0);
        let t = Transform::Slide {
            direction: SlideDirection::Left,
            duration: 1.0,
            mode: SlideMode::Enter,
        };
        let start = t.place(ClipTime::new(0.0, 5.0), rect, canvas);
        assert_eq!(start.x0, 100.0);
        let mid = t.place(ClipTime::new(0.5, 5.0), rect, canvas);
        assert_eq!(mid.x0, 55.0);
        let rest = t.place(ClipTime::new(2.0, 5.0), rect, canvas);
        assert_eq!(rest, rect);
    }

    #[test]
    fn slide_exit_leaves_past_the_edge() {
        let canvas = Canvas::new(100, 50);
        let rect = Rect::new(10.0, 0.0, 30.0, 10.0);
        let t = Transform::Slide {
            direction: SlideDirection::Left,
            duration: 1.0,
            mode: SlideMode::Exit,
        };
        assert_eq!(t.place(ClipTime::new(1.0, 5.0), rect, canvas), rect);
        assert_eq!(t.place(ClipTime::new(5.0, 5.0), rect, canvas).x1, 0.0);
    }

    #[test]
    fn zoom_scales_about_center_then_holds() {
        let canvas = Canvas::new(100, 100);
        let rect = Rect::new(40.0, 40.0, 60.0, 60.0);
        let t = Transform::Zoom {
            from: 1.0,
            to: 2.0,
            duration: 1.0,
        };
        let held = t.place(ClipTime::new(3.0, 5.0), rect, canvas);
        assert_eq!(held, Rect::new(30.0, 30.0, 70.0, 70.0));
    }

    #[test]
    fn transitions_resolve_per_kind() {
        assert!(resolve_transition(&TransitionSpec::none()).is_identity());
        assert_eq!(
            resolve_transition(&TransitionSpec::new("fade", 1.0)),
            Transform::FadeIn { duration: 1.0 }
        );
        let zoom = resolve_transition(&TransitionSpec::new("zoom", 2.0));
        assert_eq!(zoom.opacity(ClipTime::new(1.0, 10.0)), 0.5);
        assert!(resolve_transition(&TransitionSpec::new("spin", 1.0)).is_identity());
        assert!(transition_overlaps(&TransitionSpec::new("slide_left", 1.0)));
        assert!(!transition_overlaps(&TransitionSpec::new("spin", 1.0)));
        assert!(!transition_overlaps(&TransitionSpec::none()));
    }
}
