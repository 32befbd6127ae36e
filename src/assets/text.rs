use std::{path::Path, sync::Arc};

use crate::{
    config::TextStyle,
    foundation::error::{ReelError, ReelResult},
    render::frame::RasterImage,
};

const LINE_HEIGHT: f32 = 1.2;

/// Rasterizes text overlays through an SVG `<text>` document.
#[derive(Clone)]
pub struct TextRasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl std::fmt::Debug for TextRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRasterizer")
            .field("faces", &self.fontdb.len())
            .finish()
    }
}

impl TextRasterizer {
    /// System fonts plus every font file directly inside `fonts_dir`.
    pub fn new(fonts_dir: Option<&Path>) -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        if let Some(dir) = fonts_dir {
            load_fonts_from_dir(&mut db, dir);
        }
        tracing::debug!(faces = db.len(), "font database ready");
        Self {
            fontdb: Arc::new(db),
        }
    }

    pub fn has_fonts(&self) -> bool {
        !self.fontdb.is_empty()
    }

    /// Render `text` centred in a `width`x`height` box. Lines split on `\n`; the font shrinks so
    /// every line fits the box height.
    pub fn rasterize(
        &self,
        text: &str,
        width: u32,
        height: u32,
        style: &TextStyle,
        size_px: f32,
    ) -> ReelResult<RasterImage> {
        if width == 0 || height == 0 {
            return Ok(RasterImage::blank(width, height));
        }
        let svg = build_text_svg(text, width, height, style, size_px);
        let opts = usvg::Options {
            fontdb: self.fontdb.clone(),
            font_resolver: make_font_resolver(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_data(svg.as_bytes(), &opts)
            .map_err(|e| ReelError::evaluation(format!("parse text svg: {e}")))?;

        let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| ReelError::evaluation("failed to allocate text pixmap"))?;
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::identity(),
            &mut pixmap.as_mut(),
        );
        RasterImage::new(width, height, pixmap.take())
    }
}

pub(crate) fn build_text_svg(
    text: &str,
    width: u32,
    height: u32,
    style: &TextStyle,
    size_px: f32,
) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let n = lines.len().max(1) as f32;
    let size = size_px.min(height as f32 / (n * LINE_HEIGHT)).max(1.0);
    let [r, g, b, a] = style.color;
    let opacity = f32::from(a) / 255.0;

    let block = size * LINE_HEIGHT * n;
    let first_baseline = (height as f32 - block) / 2.0 + size * LINE_HEIGHT * 0.8;
    let cx = width as f32 / 2.0;

    let mut out = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><text font-family="{family}" font-size="{size}" fill="rgb({r},{g},{b})" fill-opacity="{opacity}" text-anchor="middle">"#,
        family = escape_xml(&style.family),
    );
    for (i, line) in lines.iter().enumerate() {
        let y = first_baseline + i as f32 * size * LINE_HEIGHT;
        out.push_str(&format!(
            r#"<tspan x="{cx}" y="{y}">{}</tspan>"#,
            escape_xml(line)
        ));
    }
    out.push_str("</text></svg>");
    out
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &Path) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "fonts directory is not readable");
        return;
    };

    for entry in rd.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" && ext != "ttc" {
            continue;
        }
        if let Err(e) = db.load_font_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "font file skipped");
        }
    }
}

/// Like the default resolver, but falls back to any generic family and finally to any face so
/// text renders on machines without the requested font.
fn make_font_resolver() -> usvg::FontResolver<'static> {
    use usvg::FontResolver;

    FontResolver {
        select_font: Box::new(|font, fontdb| {
            let mut families = Vec::<usvg::fontdb::Family<'_>>::new();
            for family in font.families() {
                families.push(match family {
                    usvg::FontFamily::Serif => usvg::fontdb::Family::Serif,
                    usvg::FontFamily::SansSerif => usvg::fontdb::Family::SansSerif,
                    usvg::FontFamily::Cursive => usvg::fontdb::Family::Cursive,
                    usvg::FontFamily::Fantasy => usvg::fontdb::Family::Fantasy,
                    usvg::FontFamily::Monospace => usvg::fontdb::Family::Monospace,
                    usvg::FontFamily::Named(s) => usvg::fontdb::Family::Name(s),
                });
            }
            families.push(usvg::fontdb::Family::SansSerif);
            families.push(usvg::fontdb::Family::Serif);

            let style = match font.style() {
                usvg::FontStyle::Normal => usvg::fontdb::Style::Normal,
                usvg::FontStyle::Italic => usvg::fontdb::Style::Italic,
                usvg::FontStyle::Oblique => usvg::fontdb::Style::Oblique,
            };
            let query = usvg::fontdb::Query {
                families: &families,
                weight: usvg::fontdb::Weight(font.weight()),
                stretch: usvg::fontdb::Stretch::Normal,
                style,
            };

            fontdb
                .query(&query)
                .or_else(|| fontdb.faces().next().map(|f| f.id))
        }),
        select_fallback: FontResolver::default_fallback_selector(),
    }
}
