use serde_json::json;

use crate::{
    foundation::error::{ReelError, ReelResult},
    timeline::model::{
        EffectSpec, Element, ElementId, ElementKind, Narration, Position, Project, Scene, SceneId,
        Size, SourceTrim, TransitionSpec,
    },
};

/// A reusable scene tree plus catalog metadata.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_difficulty")]
    pub difficulty_level: u8,
    #[serde(default)]
    pub industry: String,
    /// Seconds, as advertised in the catalog.
    #[serde(default)]
    pub estimated_duration: u32,
    #[serde(alias = "json_structure")]
    pub structure: TemplateStructure,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TemplateStructure {
    #[serde(default)]
    pub scenes: Vec<TemplateScene>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TemplateScene {
    pub duration: f64,
    #[serde(default, deserialize_with = "null_transition")]
    pub transition: TransitionSpec,
    #[serde(default)]
    pub elements: Vec<TemplateElement>,
}

/// Template form of an [`Element`]: same fields, no identity.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TemplateElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
    #[serde(default = "unit_volume", skip_serializing_if = "is_unit_volume")]
    pub volume: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<SourceTrim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<Narration>,
}

/// Monotonic id source for materialized scenes and elements.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IdAllocator {
    next_scene: u64,
    next_element: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next_scene: 1,
            next_element: 1,
        }
    }
}

impl IdAllocator {
    pub fn scene(&mut self) -> SceneId {
        let id = SceneId(self.next_scene);
        self.next_scene += 1;
        id
    }

    pub fn element(&mut self) -> ElementId {
        let id = ElementId(self.next_element);
        self.next_element += 1;
        id
    }

    /// Advance past every id already present in `project`.
    pub fn observe(&mut self, project: &Project) {
        for scene in &project.scenes {
            self.next_scene = self.next_scene.max(scene.id.0 + 1);
            for el in &scene.elements {
                self.next_element = self.next_element.max(el.id.0 + 1);
            }
        }
    }
}

impl Template {
    pub fn from_json_str(s: &str) -> ReelResult<Self> {
        let t: Template = serde_json::from_str(s)?;
        if t.name.trim().is_empty() {
            return Err(ReelError::validation("template name must be non-empty"));
        }
        Ok(t)
    }

    pub fn from_path(path: &std::path::Path) -> ReelResult<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| {
            ReelError::validation(format!("read template '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&s)
    }

    pub fn to_json_pretty(&self) -> ReelResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build a template from a project's current timeline.
    pub fn export(project: &Project, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: project.description.clone(),
            category: String::new(),
            difficulty_level: default_difficulty(),
            industry: String::new(),
            estimated_duration: project.declared_duration().round().max(0.0) as u32,
            structure: TemplateStructure::from_scenes(project.ordered_scenes()),
        }
    }

    /// URL-safe lowercase name used to look templates up from the CLI.
    pub fn slug(&self) -> String {
        self.name
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect()
    }
}

impl TemplateStructure {
    pub fn from_scenes<'a>(scenes: impl IntoIterator<Item = &'a Scene>) -> Self {
        Self {
            scenes: scenes
                .into_iter()
                .map(|s| TemplateScene {
                    duration: s.duration,
                    transition: s.transition.clone(),
                    elements: s.elements.iter().map(TemplateElement::from).collect(),
                })
                .collect(),
        }
    }

    /// Fresh scenes with new ids; `order` follows position in the template.
    pub fn materialize(&self, ids: &mut IdAllocator) -> Vec<Scene> {
        self.scenes
            .iter()
            .enumerate()
            .map(|(order, s)| Scene {
                id: ids.scene(),
                order: order as i64,
                duration: s.duration,
                transition: s.transition.clone(),
                elements: s
                    .elements
                    .iter()
                    .map(|e| e.clone().into_element(ids.element()))
                    .collect(),
            })
            .collect()
    }
}

impl TemplateElement {
    fn into_element(self, id: ElementId) -> Element {
        Element {
            id,
            kind: self.kind,
            content: self.content,
            position: self.position,
            size: self.size,
            start_time: self.start_time,
            end_time: self.end_time,
            effects: self.effects,
            volume: self.volume,
            trim: self.trim,
            narration: self.narration,
        }
    }
}

impl From<&Element> for TemplateElement {
    fn from(e: &Element) -> Self {
        Self {
            kind: e.kind,
            content: e.content.clone(),
            position: e.position,
            size: e.size,
            start_time: e.start_time,
            end_time: e.end_time,
            effects: e.effects.clone(),
            volume: e.volume,
            trim: e.trim,
            narration: e.narration.clone(),
        }
    }
}

/// Named effect presets offered by the editor.
pub fn effect_preset(name: &str) -> Option<EffectSpec> {
    let spec = match name {
        "blur" => EffectSpec::new("blur", json!({"radius": 5})),
        "brightness" => EffectSpec::new("brightness", json!({"factor": 1.2})),
        "contrast" => EffectSpec::new("contrast", json!({"factor": 1.2})),
        "grayscale" => EffectSpec::new("grayscale", json!({})),
        "fade_in" => EffectSpec::new("fade_in", json!({"duration": 1.0})),
        "fade_out" => EffectSpec::new("fade_out", json!({"duration": 1.0})),
        _ => return None,
    };
    Some(spec)
}

/// Named transition presets offered by the editor.
pub fn transition_preset(name: &str) -> Option<TransitionSpec> {
    let spec = match name {
        "fade" => TransitionSpec::new("fade", 1.0).with_params(json!({})),
        "slide_left" => TransitionSpec::new("slide", 1.0).with_params(json!({"direction": "left"})),
        "slide_right" => {
            TransitionSpec::new("slide", 1.0).with_params(json!({"direction": "right"}))
        }
        "zoom_in" => TransitionSpec::new("zoom", 1.0).with_params(json!({"scale": 1.5})),
        _ => return None,
    };
    Some(spec)
}

fn preset_effect(name: &str) -> Vec<EffectSpec> {
    effect_preset(name).into_iter().collect()
}

fn preset_transition(name: &str) -> TransitionSpec {
    transition_preset(name).unwrap_or_default()
}

fn text(content: &str, x: f64, y: f64, w: f64, h: f64, effects: Vec<EffectSpec>) -> TemplateElement {
    media(ElementKind::Text, content, x, y, w, h, effects)
}

fn media(
    kind: ElementKind,
    content: &str,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    effects: Vec<EffectSpec>,
) -> TemplateElement {
    TemplateElement {
        kind,
        content: content.to_string(),
        position: Position { x, y },
        size: Size {
            width: w,
            height: h,
        },
        start_time: 0.0,
        end_time: None,
        effects,
        volume: 1.0,
        trim: None,
        narration: None,
    }
}

pub fn promotional_template() -> Template {
    Template {
        name: "Promotional".to_string(),
        description: "Short promotional video".to_string(),
        category: "PROMO".to_string(),
        difficulty_level: 1,
        industry: "TECH".to_string(),
        estimated_duration: 30,
        structure: TemplateStructure {
            scenes: vec![
                TemplateScene {
                    duration: 5.0,
                    transition: preset_transition("fade"),
                    elements: vec![
                        text("Main Title", 0.5, 0.3, 0.8, 0.2, preset_effect("fade_in")),
                        media(
                            ElementKind::Video,
                            "background.mp4",
                            0.0,
                            0.0,
                            1.0,
                            1.0,
                            preset_effect("blur"),
                        ),
                    ],
                },
                TemplateScene {
                    duration: 10.0,
                    transition: preset_transition("slide_left"),
                    elements: vec![text("Product Description", 0.5, 0.5, 0.6, 0.3, Vec::new())],
                },
            ],
        },
    }
}

pub fn educational_template() -> Template {
    Template {
        name: "Educational".to_string(),
        description: "Tutorial and explainer video".to_string(),
        category: "EDUC".to_string(),
        difficulty_level: 1,
        industry: "TECH".to_string(),
        estimated_duration: 300,
        structure: TemplateStructure {
            scenes: vec![
                TemplateScene {
                    duration: 10.0,
                    transition: preset_transition("fade"),
                    elements: vec![text(
                        "Topic Introduction",
                        0.5,
                        0.2,
                        0.8,
                        0.1,
                        preset_effect("fade_in"),
                    )],
                },
                TemplateScene {
                    duration: 240.0,
                    transition: TransitionSpec::none(),
                    elements: vec![
                        media(
                            ElementKind::Video,
                            "screen_recording.mp4",
                            0.0,
                            0.0,
                            1.0,
                            0.8,
                            Vec::new(),
                        ),
                        text("Step by Step", 0.5, 0.9, 0.8, 0.1, Vec::new()),
                    ],
                },
            ],
        },
    }
}

pub fn builtin_templates() -> Vec<Template> {
    vec![promotional_template(), educational_template()]
}

/// Look a built-in template up by slug or case-insensitive name.
pub fn find_builtin(name: &str) -> Option<Template> {
    let wanted = name.trim().to_ascii_lowercase();
    builtin_templates()
        .into_iter()
        .find(|t| t.slug() == wanted || t.name.to_ascii_lowercase() == wanted)
}

fn default_difficulty() -> u8 {
    1
}

fn unit_volume() -> f32 {
    1.0
}

fn is_unit_volume(v: &f32) -> bool {
    *v == 1.0
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

fn null_transition<'de, D>(de: D) -> Result<TransitionSpec, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize as _;
    Ok(Option::<TransitionSpec>::deserialize(de)?.unwrap_or_default())
}
