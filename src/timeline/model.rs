use std::path::PathBuf;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            Debug,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identity of a [`Project`].
    ProjectId
);
id_type!(
    /// Identity of a [`Scene`], unique within its project.
    SceneId
);
id_type!(
    /// Identity of an [`Element`], unique within its project.
    ElementId
);
id_type!(
    /// Identity of a render attempt.
    TaskId
);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Processing,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A video project: metadata, lifecycle state and the scene timeline.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub script: String,
    /// Reference to user-supplied base media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_media: Option<String>,
    /// Name of the template the project was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Where completion notices go (an address or channel name; delivery is external).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl Project {
    pub fn new(id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            script: String::new(),
            base_media: None,
            template: None,
            status: ProjectStatus::Draft,
            progress: 0,
            error_message: String::new(),
            output: None,
            notify: None,
            scenes: Vec::new(),
        }
    }

    /// User-editable fields may only change in `draft` or `failed`.
    pub fn is_editable(&self) -> bool {
        matches!(self.status, ProjectStatus::Draft | ProjectStatus::Failed)
    }

    /// Script is present and there is something to build the video from.
    pub fn has_render_inputs(&self) -> bool {
        !self.script.trim().is_empty() && (self.base_media.is_some() || self.template.is_some())
    }

    pub fn can_be_processed(&self) -> bool {
        self.is_editable() && self.has_render_inputs()
    }

    /// Sum of declared scene durations, ignoring transition overlap.
    pub fn declared_duration(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration).sum()
    }

    /// Scenes in render order.
    pub fn ordered_scenes(&self) -> Vec<&Scene> {
        let mut scenes: Vec<&Scene> = self.scenes.iter().collect();
        scenes.sort_by_key(|s| (s.order, s.id));
        scenes
    }

    pub fn element_count(&self) -> usize {
        self.scenes.iter().map(|s| s.elements.len()).sum()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub id: SceneId,
    #[serde(default)]
    pub order: i64,
    /// Seconds, > 0.
    pub duration: f64,
    /// Transition into this scene from the previous one.
    #[serde(default, deserialize_with = "null_as_default")]
    pub transition: TransitionSpec,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Scene {
    /// Elements in compositing order: `start_time` ascending, ties broken by id.
    pub fn layered_elements(&self) -> Vec<&Element> {
        let mut elements: Vec<&Element> = self.elements.iter().collect();
        elements.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        elements
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransitionSpec {
    #[serde(rename = "type", default = "transition_none")]
    pub kind: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl TransitionSpec {
    pub fn none() -> Self {
        Self {
            kind: transition_none(),
            duration: 0.0,
            params: serde_json::Value::Null,
        }
    }

    pub fn new(kind: impl Into<String>, duration: f64) -> Self {
        Self {
            kind: kind.into(),
            duration,
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn is_none(&self) -> bool {
        self.kind.trim().eq_ignore_ascii_case("none")
    }
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Image,
    Video,
    Audio,
    /// Adjustment layer: applies its effects to whatever is beneath it.
    Effect,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Effect => "effect",
        }
    }

    /// Kinds whose `content` is a media reference.
    pub fn is_media(self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Audio)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
        }
    }
}

/// Window into the source media of a video/audio element, independent of timeline placement.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceTrim {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: Option<f64>,
}

/// Text voiced through the speech service when an audio element has no media content.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Narration {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Element {
    #[serde(default)]
    pub id: ElementId,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Literal text for `text`, a media reference for image/video/audio.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub start_time: f64,
    /// `None` runs until the end of the scene.
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub effects: Vec<EffectSpec>,
    #[serde(default = "unit_volume", skip_serializing_if = "is_unit_volume")]
    pub volume: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<SourceTrim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<Narration>,
}

impl Element {
    pub fn new(id: ElementId, kind: ElementKind, content: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            content: content.into(),
            position: Position::default(),
            size: Size::default(),
            start_time: 0.0,
            end_time: None,
            effects: Vec::new(),
            volume: 1.0,
            trim: None,
            narration: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.size = Size { width, height };
        self
    }

    pub fn timed(mut self, start_time: f64, end_time: Option<f64>) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_effect(mut self, effect: EffectSpec) -> Self {
        self.effects.push(effect);
        self
    }

    /// `end_time` reaches past the end of its scene.
    pub fn overruns_scene(&self, scene_duration: f64) -> bool {
        self.end_time.is_some_and(|end| end > scene_duration)
    }

    /// End of the element on the scene timeline, bounded by the scene.
    pub fn placement_end(&self, scene_duration: f64) -> f64 {
        self.end_time
            .unwrap_or(scene_duration)
            .min(scene_duration)
            .max(self.start_time)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EffectSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl EffectSpec {
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

fn transition_none() -> String {
    "none".to_string()
}

fn unit_volume() -> f32 {
    1.0
}

fn is_unit_volume(v: &f32) -> bool {
    *v == 1.0
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + serde::Deserialize<'de>,
{
    use serde::Deserialize as _;
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_json_uses_type_tag_and_defaults() {
        let el: Element = serde_json::from_str(
            r#"{"type":"text","content":"hi","position":{"x":0.5,"y":0.3},"size":{"width":0.8,"height":0.2}}"#,
        )
        .unwrap();
        assert_eq!(el.kind, ElementKind::Text);
        assert_eq!(el.start_time, 0.0);
        assert_eq!(el.end_time, None);
        assert_eq!(el.volume, 1.0);
        assert!(el.effects.is_empty());

        let s = serde_json::to_string(&el).unwrap();
        assert!(s.contains("\"type\":\"text\""));
        assert!(!s.contains("volume"));
    }

    #[test]
    fn null_transition_means_none() {
        let scene: Scene =
            serde_json::from_str(r#"{"duration":240.0,"transition":null,"elements":[]}"#).unwrap();
        assert!(scene.transition.is_none());
        assert_eq!(scene.transition.duration, 0.0);
    }

    #[test]
    fn layered_elements_sort_by_start_then_id() {
        let scene = Scene {
            id: SceneId(1),
            order: 0,
            duration: 5.0,
            transition: TransitionSpec::none(),
            elements: vec![
                Element::new(ElementId(3), ElementKind::Text, "c").timed(1.0, None),
                Element::new(ElementId(2), ElementKind::Text, "b").timed(0.0, None),
                Element::new(ElementId(1), ElementKind::Text, "a").timed(1.0, None),
            ],
        };
        let ids: Vec<u64> = scene.layered_elements().iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn render_eligibility_requires_script_and_source() {
        let mut p = Project::new(ProjectId(1), "demo");
        assert!(!p.can_be_processed());
        p.script = "  ".to_string();
        p.template = Some("promo".to_string());
        assert!(!p.can_be_processed());
        p.script = "hello".to_string();
        assert!(p.can_be_processed());
        p.status = ProjectStatus::Processing;
        assert!(!p.can_be_processed());
        p.status = ProjectStatus::Failed;
        assert!(p.can_be_processed());
    }

    #[test]
    fn placement_end_is_bounded_by_scene() {
        let el = Element::new(ElementId(1), ElementKind::Image, "a.png").timed(1.0, Some(9.0));
        assert!(el.overruns_scene(5.0));
        assert_eq!(el.placement_end(5.0), 5.0);
        let el = Element::new(ElementId(1), ElementKind::Image, "a.png").timed(2.0, None);
        assert!(!el.overruns_scene(5.0));
        assert_eq!(el.placement_end(5.0), 5.0);
        let el = Element::new(ElementId(1), ElementKind::Image, "a.png").timed(0.0, Some(5.0));
        assert!(!el.overruns_scene(5.0));
    }
}
