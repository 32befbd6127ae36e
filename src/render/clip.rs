use std::path::PathBuf;

use crate::{
    assets::media::VideoFeed,
    effects::resolve::{ClipTime, Transform},
    foundation::{
        core::{Canvas, Fps, Rect},
        error::ReelResult,
    },
    render::frame::{FrameRGBA, RasterImage, crossfade},
    timeline::model::{ElementId, ElementKind},
};

/// Lazily opened video source, scaled to the element box.
#[derive(Debug)]
pub struct VideoSource {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub source_start: f64,
    pub source_duration: Option<f64>,
    feed: Option<VideoFeed>,
}

impl VideoSource {
    pub fn new(
        path: PathBuf,
        width: u32,
        height: u32,
        source_start: f64,
        source_duration: Option<f64>,
    ) -> Self {
        Self {
            path,
            width,
            height,
            source_start,
            source_duration,
            feed: None,
        }
    }
}

#[derive(Debug)]
pub enum VisualSource {
    /// Audio-only or degenerate clips.
    None,
    Still(RasterImage),
    Video(VideoSource),
    /// Applies the clip's pixel transforms to whatever lies beneath.
    Adjustment,
}

/// Audio reference placed on the clip; decoded only when the project mix is built.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioSource {
    pub path: PathBuf,
    pub source_start: f64,
    pub source_duration: Option<f64>,
    pub volume: f32,
}

/// One visual sample of a clip, ready to draw.
#[derive(Clone, Debug)]
pub struct LayerFrame {
    pub image: RasterImage,
    pub dest: Rect,
    pub opacity: f32,
}

/// A rendered element: content bounded to `[start, end)` on the scene timeline, placed at
/// `bounds`, with its transform chain.
#[derive(Debug)]
pub struct TimedClip {
    pub element: Option<ElementId>,
    pub kind: Option<ElementKind>,
    pub start: f64,
    pub end: f64,
    pub bounds: Rect,
    pub visual: VisualSource,
    pub audio: Option<AudioSource>,
    pub transforms: Vec<Transform>,
    baked: bool,
}

impl TimedClip {
    pub fn new(start: f64, end: f64, bounds: Rect, visual: VisualSource) -> Self {
        Self {
            element: None,
            kind: None,
            start,
            end: end.max(start),
            bounds,
            visual,
            audio: None,
            transforms: Vec::new(),
            baked: false,
        }
    }

    /// A clip that occupies no time and renders nothing.
    pub fn empty(at: f64) -> Self {
        Self::new(at, at, Rect::ZERO, VisualSource::None)
    }

    pub fn for_element(mut self, id: ElementId, kind: ElementKind) -> Self {
        self.element = Some(id);
        self.kind = Some(kind);
        self
    }

    pub fn with_audio(mut self, audio: Option<AudioSource>) -> Self {
        self.audio = audio;
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.duration() <= 0.0
    }

    pub fn is_active(&self, t: f64) -> bool {
        !self.is_empty() && t >= self.start && t < self.end
    }

    pub fn is_adjustment(&self) -> bool {
        matches!(self.visual, VisualSource::Adjustment)
    }

    pub fn clip_time(&self, t: f64) -> ClipTime {
        ClipTime::new(t - self.start, self.duration())
    }

    pub fn opacity(&self, ct: ClipTime) -> f32 {
        self.transforms.iter().map(|tr| tr.opacity(ct)).product()
    }

    pub fn gain(&self, ct: ClipTime) -> f32 {
        self.transforms.iter().map(|tr| tr.gain(ct)).product()
    }

    fn apply_pixels(&self, image: &mut RasterImage) -> ReelResult<()> {
        let (w, h) = (image.width, image.height);
        for tr in self.transforms.iter().filter(|tr| tr.touches_pixels()) {
            tr.apply_pixels(image.pixels_mut(), w, h)?;
        }
        Ok(())
    }

    fn has_pixel_ops(&self) -> bool {
        self.transforms.iter().any(Transform::touches_pixels)
    }

    /// Sample the clip at scene time `t`. `None` when inactive or invisible.
    pub fn sample(&mut self, t: f64, fps: Fps, canvas: Canvas) -> ReelResult<Option<LayerFrame>> {
        if !self.is_active(t) {
            return Ok(None);
        }
        let ct = self.clip_time(t);
        let opacity = self.opacity(ct);
        if opacity <= 0.0 {
            return Ok(None);
        }
        let dest = self
            .transforms
            .iter()
            .fold(self.bounds, |r, tr| tr.place(ct, r, canvas));

        let image = match &mut self.visual {
            VisualSource::None | VisualSource::Adjustment => return Ok(None),
            VisualSource::Still(img) => {
                if !self.baked {
                    // Pixel effects are time-invariant: bake once.
                    let mut baked = img.clone();
                    self.baked = true;
                    let (w, h) = (baked.width, baked.height);
                    for tr in self.transforms.iter().filter(|tr| tr.touches_pixels()) {
                        tr.apply_pixels(baked.pixels_mut(), w, h)?;
                    }
                    *img = baked;
                }
                img.clone()
            }
            VisualSource::Video(src) => {
                if src.feed.is_none() {
                    src.feed = Some(VideoFeed::open(
                        &src.path,
                        src.width,
                        src.height,
                        fps,
                        src.source_start,
                        src.source_duration,
                    )?);
                }
                let index = (ct.local * fps.as_f64() + 1e-6).floor().max(0.0) as u64;
                let frame = match src.feed.as_mut() {
                    Some(feed) => feed.frame_at(index)?.cloned(),
                    None => None,
                };
                let Some(mut frame) = frame else {
                    return Ok(None);
                };
                if self.has_pixel_ops() {
                    self.apply_pixels(&mut frame)?;
                }
                frame
            }
        };

        Ok(Some(LayerFrame {
            image,
            dest,
            opacity,
        }))
    }

    /// Apply an adjustment clip's pixel transforms to `frame` at scene time `t`.
    pub fn adjust(&self, t: f64, frame: &mut FrameRGBA) -> ReelResult<()> {
        if !self.is_adjustment() || !self.is_active(t) || !self.has_pixel_ops() {
            return Ok(());
        }
        let opacity = self.opacity(self.clip_time(t));
        if opacity <= 0.0 {
            return Ok(());
        }
        let mut adjusted = frame.data.clone();
        for tr in self.transforms.iter().filter(|tr| tr.touches_pixels()) {
            tr.apply_pixels(&mut adjusted, frame.width, frame.height)?;
        }
        if opacity >= 1.0 {
            frame.data = adjusted;
        } else {
            for (d, a) in frame.data.chunks_exact_mut(4).zip(adjusted.chunks_exact(4)) {
                let out = crossfade([d[0], d[1], d[2], d[3]], [a[0], a[1], a[2], a[3]], opacity);
                d.copy_from_slice(&out);
            }
        }
        Ok(())
    }

    /// Drop decoder state once the clip is over.
    pub fn release(&mut self) {
        if let VisualSource::Video(src) = &mut self.visual
            && src.feed.take().is_some()
        {
            tracing::debug!(path = %src.path.display(), "video feed closed");
        }
    }

    /// Stop drawing this clip after an unrecoverable sampling failure.
    pub fn disable(&mut self) {
        self.release();
        self.visual = VisualSource::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Rgba8Premul;

    fn still(start: f64, end: f64) -> TimedClip {
        let img = RasterImage::new(2, 2, [100u8, 150, 200, 255].repeat(4)).unwrap();
        TimedClip::new(
            start,
            end,
            Rect::new(0.0, 0.0, 2.0, 2.0),
            VisualSource::Still(img),
        )
    }

    #[test]
    fn activity_is_half_open() {
        let c = still(1.0, 2.0);
        assert!(!c.is_active(0.99));
        assert!(c.is_active(1.0));
        assert!(!c.is_active(2.0));
        assert!(!TimedClip::empty(1.0).is_active(1.0));
    }

    #[test]
    fn sample_applies_fade_and_bakes_pixels_once() {
        let mut c = Transform::Grayscale.apply(Transform::FadeIn { duration: 1.0 }.apply(still(0.0, 4.0)));
        let fps = Fps::new(10, 1).unwrap();
        let canvas = Canvas::new(4, 4);
        assert!(c.sample(0.0, fps, canvas).unwrap().is_none());
        let layer = c.sample(0.5, fps, canvas).unwrap().unwrap();
        assert_eq!(layer.opacity, 0.5);
        let g = layer.image.pixels[0];
        assert_eq!(&layer.image.pixels[..3], &[g, g, g]);
        let again = c.sample(2.0, fps, canvas).unwrap().unwrap();
        assert_eq!(again.image, layer.image);
    }

    #[test]
    fn adjustment_rewrites_canvas_in_window() {
        let clip = Transform::Grayscale.apply(TimedClip::new(
            0.0,
            1.0,
            Rect::ZERO,
            VisualSource::Adjustment,
        ));
        let mut frame = FrameRGBA::solid(
            Canvas::new(1, 1),
            Rgba8Premul::from_straight_rgba(255, 0, 0, 255),
        );
        clip.adjust(2.0, &mut frame).unwrap();
        assert_eq!(frame.pixel(0, 0), [255, 0, 0, 255]);
        clip.adjust(0.5, &mut frame).unwrap();
        assert_eq!(frame.pixel(0, 0), [76, 76, 76, 255]);
    }
}
