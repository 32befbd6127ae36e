use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::foundation::{
    core::{Canvas, Fps, Rgba8Premul},
    error::{ReelError, ReelResult},
};

/// Engine settings. Every field has a default so a config file only lists what it changes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub canvas: Canvas,
    pub fps: Fps,
    /// Straight RGBA background drawn beneath every scene.
    pub background: [u8; 4],
    /// Relative media references resolve against this directory.
    pub media_root: PathBuf,
    /// Finished artifacts land here.
    pub output_dir: PathBuf,
    /// Per-task scratch directories are created here.
    pub work_dir: PathBuf,
    pub text: TextStyle,
    /// Extra `.ttf`/`.otf`/`.ttc` files to load next to the system fonts.
    pub fonts_dir: Option<PathBuf>,
    pub workers: usize,
    pub audio_sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canvas: Canvas::default(),
            fps: Fps::default(),
            background: [0, 0, 0, 255],
            media_root: PathBuf::from("."),
            output_dir: PathBuf::from("output"),
            work_dir: std::env::temp_dir().join("reelforge"),
            text: TextStyle::default(),
            fonts_dir: None,
            workers: 2,
            audio_sample_rate: 48_000,
        }
    }
}

impl EngineConfig {
    pub fn from_path(path: &Path) -> ReelResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: EngineConfig = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(ReelError::validation("canvas width/height must be > 0"));
        }
        // yuv420p needs even dimensions.
        if self.canvas.width % 2 != 0 || self.canvas.height % 2 != 0 {
            return Err(ReelError::validation(format!(
                "canvas {}x{} must have even dimensions",
                self.canvas.width, self.canvas.height
            )));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if self.workers == 0 {
            return Err(ReelError::validation("workers must be >= 1"));
        }
        if self.audio_sample_rate == 0 {
            return Err(ReelError::validation("audio_sample_rate must be > 0"));
        }
        if !self.text.size.is_finite() || self.text.size <= 0.0 {
            return Err(ReelError::validation("text.size must be finite and > 0"));
        }
        Ok(())
    }

    pub fn background_premul(&self) -> Rgba8Premul {
        let [r, g, b, a] = self.background;
        Rgba8Premul::from_straight_rgba(r, g, b, a)
    }

    /// Font size in pixels for the configured canvas (the style is authored against 1080 lines).
    pub fn text_size_px(&self) -> f32 {
        self.text.size * self.canvas.height as f32 / 1080.0
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub family: String,
    /// Pixels at a 1080-pixel-high canvas.
    pub size: f32,
    /// Straight RGBA.
    pub color: [u8; 4],
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            family: "sans-serif".to_string(),
            size: 48.0,
            color: [255, 255, 255, 255],
        }
    }
}
