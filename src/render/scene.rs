use crate::{
    audio::mix::{AudioSegment, Envelope},
    effects::resolve::Transform,
    foundation::{
        core::{Canvas, Fps, Rgba8Premul},
        error::ReelResult,
    },
    render::{
        clip::TimedClip,
        element::{ElementContext, render_element},
        frame::{FrameRGBA, draw_image},
    },
    timeline::model::{Scene, SceneId},
};

/// A composed scene: its layers in compositing order over a fixed-size background.
#[derive(Debug)]
pub struct SceneClip {
    pub scene: SceneId,
    pub duration: f64,
    canvas: Canvas,
    fps: Fps,
    background: Rgba8Premul,
    layers: Vec<TimedClip>,
    /// Elements the scene declared.
    pub declared: usize,
    /// Elements that failed to render and were skipped.
    pub failed: usize,
}

impl SceneClip {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Render the scene at scene-relative time `t`.
    pub fn render_frame(&mut self, t: f64) -> ReelResult<FrameRGBA> {
        let mut frame = FrameRGBA::solid(self.canvas, self.background);
        for layer in &mut self.layers {
            if t >= layer.end {
                layer.release();
                continue;
            }
            if layer.is_adjustment() {
                layer.adjust(t, &mut frame)?;
                continue;
            }
            match layer.sample(t, self.fps, self.canvas) {
                Ok(Some(sample)) => draw_image(&mut frame, &sample.image, sample.dest, sample.opacity),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        scene = %self.scene,
                        element = ?layer.element,
                        error = %e,
                        "layer sampling failed; layer dropped"
                    );
                    layer.disable();
                }
            }
        }
        Ok(frame)
    }

    /// Audio of every layer, placed at `offset` on the project timeline, each shaped by its own
    /// transforms and by `scene_envelope`.
    pub fn audio_segments(&self, offset: f64, scene_envelope: &Transform) -> Vec<AudioSegment> {
        self.layers
            .iter()
            .filter(|l| !l.is_empty())
            .filter_map(|l| {
                let audio = l.audio.as_ref()?;
                let mut envelopes = vec![Envelope {
                    transform: Transform::compose(l.transforms.iter().cloned()),
                    origin: offset + l.start,
                    length: l.duration(),
                }];
                if !scene_envelope.is_identity() {
                    envelopes.push(Envelope {
                        transform: scene_envelope.clone(),
                        origin: offset,
                        length: self.duration,
                    });
                }
                Some(AudioSegment {
                    path: audio.path.clone(),
                    source_start: audio.source_start,
                    source_duration: audio.source_duration,
                    timeline_start: offset + l.start,
                    duration: l.duration(),
                    volume: audio.volume,
                    envelopes,
                })
            })
            .collect()
    }

    /// Release every decoder held by this scene.
    pub fn finish(&mut self) {
        for layer in &mut self.layers {
            layer.release();
        }
    }
}

/// Render every element of `scene` and layer the results by `start_time` (ties by element id).
///
/// Element failures are logged and skipped; they never fail the scene.
pub fn compose_scene(
    scene: &Scene,
    ctx: &ElementContext<'_>,
    fps: Fps,
    background: Rgba8Premul,
) -> SceneClip {
    let mut layers = Vec::with_capacity(scene.elements.len());
    let mut failed = 0usize;

    for el in scene.layered_elements() {
        match render_element(el, ctx) {
            Ok(clip) if clip.is_empty() => {
                tracing::debug!(scene = %scene.id, element = %el.id, "zero-length element");
            }
            Ok(clip) => layers.push(clip),
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    scene = %scene.id,
                    element = %el.id,
                    kind = el.kind.as_str(),
                    error_kind = ?e.kind(),
                    error = %e,
                    "element skipped"
                );
            }
        }
    }

    let declared = scene.elements.len();
    if failed > 0 && failed == declared && declared == 1 {
        tracing::info!(scene = %scene.id, "scene rendered as blank placeholder");
    }

    SceneClip {
        scene: scene.id,
        duration: scene.duration,
        canvas: ctx.canvas,
        fps,
        background,
        layers,
        declared,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        path::{Path, PathBuf},
    };

    use super::*;
    use crate::{
        assets::{source::MediaResolver, text::TextRasterizer},
        config::TextStyle,
        services::NoSpeech,
        timeline::model::{Element, ElementId, ElementKind, TransitionSpec},
    };

    fn write_png(dir: &Path, name: &str, px: [u8; 4]) {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba(px));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(dir.join(name), buf).unwrap();
    }

    fn fixture_dir() -> PathBuf {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("target/test-scene");
        std::fs::create_dir_all(&dir).unwrap();
        write_png(&dir, "red.png", [255, 0, 0, 255]);
        write_png(&dir, "blue.png", [0, 0, 255, 255]);
        dir
    }

    fn scene(elements: Vec<Element>) -> Scene {
        Scene {
            id: SceneId(1),
            order: 0,
            duration: 2.0,
            transition: TransitionSpec::none(),
            elements,
        }
    }

    fn compose(scene: &Scene, dir: &Path) -> SceneClip {
        let media = MediaResolver::new(dir);
        let text = TextRasterizer::new(None);
        let style = TextStyle::default();
        let ctx = ElementContext {
            canvas: Canvas::new(8, 8),
            scene_duration: scene.duration,
            media: &media,
            text: &text,
            text_style: &style,
            text_size_px: 4.0,
            speech: &NoSpeech,
            scratch: dir,
        };
        compose_scene(
            scene,
            &ctx,
            Fps::new(10, 1).unwrap(),
            Rgba8Premul::from_straight_rgba(0, 0, 0, 255),
        )
    }

    #[test]
    fn later_start_draws_on_top_and_ties_break_by_id() {
        let dir = fixture_dir();
        let s = scene(vec![
            Element::new(ElementId(2), ElementKind::Image, "blue.png").timed(0.0, None),
            Element::new(ElementId(1), ElementKind::Image, "red.png").timed(0.0, None),
            Element::new(ElementId(3), ElementKind::Image, "red.png")
                .sized(0.5, 0.5)
                .timed(1.0, None),
        ]);
        let mut clip = compose(&s, &dir);
        // Equal start: id 2 (blue) is above id 1 (red).
        assert_eq!(clip.render_frame(0.5).unwrap().pixel(0, 0), [0, 0, 255, 255]);
        // Later start lands above both.
        let f = clip.render_frame(1.5).unwrap();
        assert_eq!(f.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(f.pixel(7, 7), [0, 0, 255, 255]);
    }

    #[test]
    fn single_missing_element_is_blank_placeholder() {
        let dir = fixture_dir();
        let s = scene(vec![Element::new(
            ElementId(1),
            ElementKind::Image,
            "missing.png",
        )]);
        let mut clip = compose(&s, &dir);
        assert_eq!((clip.declared, clip.failed), (1, 1));
        assert_eq!(clip.layer_count(), 0);
        assert_eq!(clip.render_frame(0.0).unwrap().pixel(3, 3), [0, 0, 0, 255]);
        assert!(clip.audio_segments(0.0, &Transform::Identity).is_empty());
    }

    #[test]
    fn failed_elements_are_counted_per_scene() {
        let dir = fixture_dir();
        let s = scene(vec![
            Element::new(ElementId(1), ElementKind::Image, "a.png"),
            Element::new(ElementId(2), ElementKind::Image, "red.png"),
            Element::new(ElementId(3), ElementKind::Image, "b.png"),
        ]);
        let clip = compose(&s, &dir);
        assert_eq!((clip.declared, clip.failed), (3, 2));
        assert_eq!(clip.layer_count(), 1);
    }

    #[test]
    fn zero_length_elements_are_dropped_silently() {
        let dir = fixture_dir();
        let s = scene(vec![
            Element::new(ElementId(1), ElementKind::Image, "red.png").timed(1.0, Some(1.0)),
        ]);
        let mut clip = compose(&s, &dir);
        assert_eq!(clip.failed, 0);
        assert_eq!(clip.layer_count(), 0);
        assert_eq!(clip.render_frame(1.0).unwrap().pixel(0, 0), [0, 0, 0, 255]);
    }
}
