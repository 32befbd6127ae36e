use std::path::{Path, PathBuf};

use crate::{
    assets::{
        decode::load_image_fitted,
        media::{MediaInfo, probe_media},
        source::MediaResolver,
        text::TextRasterizer,
    },
    config::TextStyle,
    effects::resolve::resolve_effects,
    foundation::{
        core::{Canvas, Rect},
        error::{ReelError, ReelResult},
    },
    render::clip::{AudioSource, TimedClip, VideoSource, VisualSource},
    services::{SpeechRequest, SpeechSynthesizer},
    timeline::model::{Element, ElementKind},
};

/// Everything an element needs to turn into a clip.
pub struct ElementContext<'a> {
    pub canvas: Canvas,
    pub scene_duration: f64,
    pub media: &'a MediaResolver,
    pub text: &'a TextRasterizer,
    pub text_style: &'a TextStyle,
    pub text_size_px: f32,
    pub speech: &'a dyn SpeechSynthesizer,
    /// Generated files (narration audio) are written here.
    pub scratch: &'a Path,
}

impl ElementContext<'_> {
    fn bounds(&self, el: &Element) -> Rect {
        self.canvas
            .resolve_box(el.position.x, el.position.y, el.size.width, el.size.height)
    }

    fn box_px(&self, el: &Element) -> (u32, u32) {
        let r = self.bounds(el);
        (
            r.width().round().max(0.0) as u32,
            r.height().round().max(0.0) as u32,
        )
    }
}

/// Produces the content of one element kind. Timing and effects are handled by [`render_element`].
pub trait Renderable {
    fn render(&self, element: &Element, ctx: &ElementContext<'_>) -> ReelResult<TimedClip>;
}

struct TextRenderer;
struct ImageRenderer;
struct VideoRenderer;
struct AudioRenderer;
struct EffectLayerRenderer;

fn renderer_for(kind: ElementKind) -> &'static dyn Renderable {
    match kind {
        ElementKind::Text => &TextRenderer,
        ElementKind::Image => &ImageRenderer,
        ElementKind::Video => &VideoRenderer,
        ElementKind::Audio => &AudioRenderer,
        ElementKind::Effect => &EffectLayerRenderer,
    }
}

fn placement(el: &Element, ctx: &ElementContext<'_>) -> (f64, f64) {
    (el.start_time, el.placement_end(ctx.scene_duration))
}

impl Renderable for TextRenderer {
    fn render(&self, el: &Element, ctx: &ElementContext<'_>) -> ReelResult<TimedClip> {
        let (start, end) = placement(el, ctx);
        let (w, h) = ctx.box_px(el);
        let visual = if w == 0 || h == 0 {
            VisualSource::None
        } else {
            VisualSource::Still(ctx.text.rasterize(
                &el.content,
                w,
                h,
                ctx.text_style,
                ctx.text_size_px,
            )?)
        };
        Ok(TimedClip::new(start, end, ctx.bounds(el), visual))
    }
}

impl Renderable for ImageRenderer {
    fn render(&self, el: &Element, ctx: &ElementContext<'_>) -> ReelResult<TimedClip> {
        let (start, end) = placement(el, ctx);
        let path = ctx.media.resolve(&el.content)?;
        let (w, h) = ctx.box_px(el);
        let visual = if w == 0 || h == 0 {
            VisualSource::None
        } else {
            VisualSource::Still(load_image_fitted(&path, w, h)?)
        };
        Ok(TimedClip::new(start, end, ctx.bounds(el), visual))
    }
}

/// Source window for video/audio: explicit trim, capped to the placement length.
fn source_window(el: &Element, placement_len: f64) -> (f64, Option<f64>) {
    let trim_start = el.trim.map_or(0.0, |t| t.start.max(0.0));
    let trim_len = el
        .trim
        .and_then(|t| t.end)
        .map(|end| (end - trim_start).max(0.0));
    let len = match trim_len {
        Some(l) => l.min(placement_len),
        None => placement_len,
    };
    (trim_start, Some(len))
}

fn probe(path: &Path) -> ReelResult<MediaInfo> {
    let info = probe_media(path)?;
    tracing::debug!(
        path = %path.display(),
        video = ?info.video,
        has_audio = info.has_audio,
        duration = info.duration_sec,
        "probed media"
    );
    Ok(info)
}

impl Renderable for VideoRenderer {
    fn render(&self, el: &Element, ctx: &ElementContext<'_>) -> ReelResult<TimedClip> {
        let (start, end) = placement(el, ctx);
        let path = ctx.media.resolve(&el.content)?;
        let info = probe(&path)?;
        if info.video.is_none() {
            return Err(ReelError::media_not_found(format!(
                "{}: no video stream",
                path.display()
            )));
        }
        let (source_start, source_len) = source_window(el, end - start);
        let (w, h) = ctx.box_px(el);
        let visual = if w == 0 || h == 0 {
            VisualSource::None
        } else {
            VisualSource::Video(VideoSource::new(
                path.clone(),
                w,
                h,
                source_start,
                source_len,
            ))
        };
        let audio = info.has_audio.then(|| AudioSource {
            path,
            source_start,
            source_duration: source_len,
            volume: el.volume,
        });
        Ok(TimedClip::new(start, end, ctx.bounds(el), visual).with_audio(audio))
    }
}

impl Renderable for AudioRenderer {
    fn render(&self, el: &Element, ctx: &ElementContext<'_>) -> ReelResult<TimedClip> {
        let (start, end) = placement(el, ctx);
        let path = if el.content.trim().is_empty() {
            narrate(el, ctx)?
        } else {
            ctx.media.resolve(&el.content)?
        };
        let info = probe(&path)?;
        if !info.has_audio {
            return Err(ReelError::media_not_found(format!(
                "{}: no audio stream",
                path.display()
            )));
        }
        let (source_start, source_len) = source_window(el, end - start);
        let audio = AudioSource {
            path,
            source_start,
            source_duration: source_len,
            volume: el.volume,
        };
        Ok(TimedClip::new(start, end, Rect::ZERO, VisualSource::None).with_audio(Some(audio)))
    }
}

fn narrate(el: &Element, ctx: &ElementContext<'_>) -> ReelResult<PathBuf> {
    let Some(narration) = el.narration.as_ref().filter(|n| !n.text.trim().is_empty()) else {
        return Err(ReelError::media_not_found("audio element has no content"));
    };
    let audio = ctx.speech.synthesize(&SpeechRequest {
        text: narration.text.clone(),
        voice: narration.voice.clone(),
    })?;
    let path = ctx
        .scratch
        .join(format!("narration_{}.{}", el.id, audio.extension));
    std::fs::write(&path, &audio.bytes).map_err(|e| {
        ReelError::external_service(format!("store narration '{}': {e}", path.display()))
    })?;
    tracing::debug!(element = %el.id, bytes = audio.bytes.len(), "narration synthesized");
    Ok(path)
}

impl Renderable for EffectLayerRenderer {
    fn render(&self, el: &Element, ctx: &ElementContext<'_>) -> ReelResult<TimedClip> {
        let (start, end) = placement(el, ctx);
        let full = Rect::new(
            0.0,
            0.0,
            f64::from(ctx.canvas.width),
            f64::from(ctx.canvas.height),
        );
        Ok(TimedClip::new(start, end, full, VisualSource::Adjustment))
    }
}

/// Resolve one element into a time-bounded, positioned clip with its effect chain applied.
///
/// A zero-length placement yields an empty clip without touching the element's media.
pub fn render_element(element: &Element, ctx: &ElementContext<'_>) -> ReelResult<TimedClip> {
    let (start, end) = placement(element, ctx);
    if element.overruns_scene(ctx.scene_duration) {
        tracing::warn!(
            element = %element.id,
            end_time = ?element.end_time,
            clamped = end,
            "end_time clamped to scene duration"
        );
    }
    if end <= start {
        return Ok(TimedClip::empty(start).for_element(element.id, element.kind));
    }
    let clip = renderer_for(element.kind).render(element, ctx)?;
    let clip = clip.for_element(element.id, element.kind);
    Ok(resolve_effects(&element.effects).apply(clip))
}
