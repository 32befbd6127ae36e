use crate::{
    foundation::error::{ReelError, ReelResult},
    timeline::model::{EffectSpec, TransitionSpec},
};

pub const DEFAULT_BLUR_RADIUS: f64 = 5.0;
pub const DEFAULT_FACTOR: f64 = 1.2;
pub const DEFAULT_DURATION: f64 = 1.0;
pub const DEFAULT_ZOOM_SCALE: f64 = 1.5;

pub const MAX_BLUR_RADIUS: f64 = 256.0;
pub const MIN_FACTOR: f64 = 0.01;
pub const MAX_FACTOR: f64 = 16.0;
pub const MIN_ZOOM_SCALE: f64 = 0.01;
pub const MAX_ZOOM_SCALE: f64 = 100.0;

/// Horizontal travel direction of a slide. `Left` moves leftward: it enters from the right edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlideDirection {
    #[default]
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlideMode {
    #[default]
    Enter,
    Exit,
}

/// A parsed effect descriptor with every parameter defaulted and clamped into its domain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Effect {
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
        scale: f64,
        duration: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransitionKind {
    None,
    Fade,
    Slide { direction: SlideDirection },
    Zoom { scale: f64 },
}

/// Parse an effect descriptor.
///
/// Returns `Ok(None)` for an unrecognised `type`. Structurally malformed params (wrong JSON type,
/// unknown enum string) are errors; out-of-domain numbers are clamped with a warning.
pub fn parse_effect(spec: &EffectSpec) -> ReelResult<Option<Effect>> {
    let kind = normalize_kind(&spec.kind);
    let what = kind.as_str();
    let params = Params::new(&spec.params, what)?;

    let effect = match what {
        "blur" => {
            let radius = params.number("radius")?.unwrap_or(DEFAULT_BLUR_RADIUS);
            Effect::Blur {
                radius: clamp_param(what, "radius", radius, 0.0, MAX_BLUR_RADIUS) as f32,
            }
        }
        "brightness" => Effect::Brightness {
            factor: params.factor(what)?,
        },
        "contrast" => Effect::Contrast {
            factor: params.factor(what)?,
        },
        "grayscale" | "greyscale" => Effect::Grayscale,
        "fade_in" | "fadein" => Effect::FadeIn {
            duration: params.duration(what)?,
        },
        "fade_out" | "fadeout" => Effect::FadeOut {
            duration: params.duration(what)?,
        },
        "slide" => Effect::Slide {
            direction: params.direction(what)?,
            duration: params.duration(what)?,
            mode: params.mode(what)?,
        },
        "zoom" => {
            let scale = params.number("scale")?.unwrap_or(DEFAULT_ZOOM_SCALE);
            Effect::Zoom {
                scale: clamp_param(what, "scale", scale, MIN_ZOOM_SCALE, MAX_ZOOM_SCALE),
                duration: params.duration(what)?,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(effect))
}

/// Parse a transition descriptor. Returns `Ok(None)` for an unrecognised `type`.
pub fn parse_transition(spec: &TransitionSpec) -> ReelResult<Option<TransitionKind>> {
    let kind = normalize_kind(&spec.kind);
    let what = kind.as_str();
    let params = Params::new(&spec.params, what)?;

    let transition = match what {
        "" | "none" => TransitionKind::None,
        "fade" | "crossfade" => TransitionKind::Fade,
        "slide" => TransitionKind::Slide {
            direction: params.direction(what)?,
        },
        // Preset names carry the direction in the type.
        "slide_left" => TransitionKind::Slide {
            direction: SlideDirection::Left,
        },
        "slide_right" => TransitionKind::Slide {
            direction: SlideDirection::Right,
        },
        "zoom" => {
            let scale = params.number("scale")?.unwrap_or(DEFAULT_ZOOM_SCALE);
            TransitionKind::Zoom {
                scale: clamp_param(what, "scale", scale, MIN_ZOOM_SCALE, MAX_ZOOM_SCALE),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(transition))
}

fn normalize_kind(kind: &str) -> String {
    kind.trim().to_ascii_lowercase().replace('-', "_")
}

pub(crate) fn clamp_param(what: &str, key: &str, value: f64, lo: f64, hi: f64) -> f64 {
    let clamped = value.clamp(lo, hi);
    if clamped != value {
        tracing::warn!(effect = what, param = key, value, clamped, "parameter clamped");
    }
    clamped
}

struct Params<'a> {
    obj: Option<&'a serde_json::Map<String, serde_json::Value>>,
    what: &'a str,
}

impl<'a> Params<'a> {
    fn new(params: &'a serde_json::Value, what: &'a str) -> ReelResult<Self> {
        let obj = if params.is_null() {
            None
        } else {
            Some(params.as_object().ok_or_else(|| {
                ReelError::validation(format!("{what} params must be an object"))
            })?)
        };
        Ok(Self { obj, what })
    }

    fn get(&self, key: &str) -> Option<&'a serde_json::Value> {
        self.obj.and_then(|o| o.get(key)).filter(|v| !v.is_null())
    }

    fn number(&self, key: &str) -> ReelResult<Option<f64>> {
        let Some(v) = self.get(key) else {
            return Ok(None);
        };
        let Some(n) = v.as_f64() else {
            return Err(ReelError::validation(format!(
                "{}.{key} must be a number",
                self.what
            )));
        };
        Ok(Some(n))
    }

    fn string(&self, key: &str) -> ReelResult<Option<&'a str>> {
        let Some(v) = self.get(key) else {
            return Ok(None);
        };
        v.as_str().map(Some).ok_or_else(|| {
            ReelError::validation(format!("{}.{key} must be a string", self.what))
        })
    }

    fn factor(&self, what: &str) -> ReelResult<f32> {
        let factor = self.number("factor")?.unwrap_or(DEFAULT_FACTOR);
        Ok(clamp_param(what, "factor", factor, MIN_FACTOR, MAX_FACTOR) as f32)
    }

    fn duration(&self, what: &str) -> ReelResult<f64> {
        let duration = self.number("duration")?.unwrap_or(DEFAULT_DURATION);
        Ok(clamp_param(what, "duration", duration, 0.0, f64::MAX))
    }

    fn direction(&self, what: &str) -> ReelResult<SlideDirection> {
        match self.string("direction")? {
            None => Ok(SlideDirection::default()),
            Some(s) => match s.trim().to_ascii_lowercase().as_str() {
                "left" => Ok(SlideDirection::Left),
                "right" => Ok(SlideDirection::Right),
                other => Err(ReelError::validation(format!(
                    "unknown {what}.direction '{other}'"
                ))),
            },
        }
    }

    fn mode(&self, what: &str) -> ReelResult<SlideMode> {
        match self.string("mode")? {
            None => Ok(SlideMode::default()),
            Some(s) => match s.trim().to_ascii_lowercase().as_str() {
                "enter" | "in" => Ok(SlideMode::Enter),
                "exit" | "out" => Ok(SlideMode::Exit),
                other => Err(ReelError::validation(format!(
                    "unknown {what}.mode '{other}'"
                ))),
            },
        }
    }
}
