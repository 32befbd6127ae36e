use crate::{
    effects::params::{parse_effect, parse_transition},
    foundation::error::ReelError,
    timeline::model::{Element, ElementId, ElementKind, Project, Scene, SceneId},
};

/// Entity a violation is keyed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Project,
    Scene(SceneId),
    Element(ElementId),
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Project => write!(f, "project"),
            EntityRef::Scene(id) => write!(f, "scene {id}"),
            EntityRef::Element(id) => write!(f, "element {id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationError {
    pub entity: EntityRef,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.entity, self.field, self.message)
    }
}

impl ValidationError {
    fn new(entity: EntityRef, field: &str, message: impl Into<String>) -> Self {
        Self {
            entity,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Collapse a violation list into one [`ReelError::Validation`].
pub fn violations_to_error(violations: &[ValidationError]) -> ReelError {
    let joined = violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    ReelError::validation(joined)
}

/// Check every structural invariant of a project's timeline. An empty result means renderable.
pub fn validate_project(project: &Project) -> Vec<ValidationError> {
    let mut out = Vec::new();

    let mut orders: Vec<i64> = project.scenes.iter().map(|s| s.order).collect();
    orders.sort_unstable();
    for pair in orders.windows(2) {
        if pair[0] == pair[1] {
            out.push(ValidationError::new(
                EntityRef::Project,
                "scenes.order",
                format!("scene order {} is used more than once", pair[0]),
            ));
        }
    }
    let mut dedup = orders.clone();
    dedup.dedup();
    if dedup.iter().enumerate().any(|(i, &o)| o != i as i64) {
        out.push(ValidationError::new(
            EntityRef::Project,
            "scenes.order",
            format!("scene orders must be contiguous from 0, got {dedup:?}"),
        ));
    }

    let mut seen_elements = std::collections::HashSet::new();
    for scene in &project.scenes {
        validate_scene(scene, &mut out);
        for el in &scene.elements {
            if el.id != ElementId::default() && !seen_elements.insert(el.id) {
                out.push(ValidationError::new(
                    EntityRef::Element(el.id),
                    "id",
                    "element id is used more than once",
                ));
            }
        }
    }

    out
}

fn validate_scene(scene: &Scene, out: &mut Vec<ValidationError>) {
    let entity = EntityRef::Scene(scene.id);
    if !scene.duration.is_finite() || scene.duration <= 0.0 {
        out.push(ValidationError::new(
            entity,
            "duration",
            format!("must be finite and > 0, got {}", scene.duration),
        ));
    }
    let transition = &scene.transition;
    if !transition.duration.is_finite() || transition.duration < 0.0 {
        out.push(ValidationError::new(
            entity,
            "transition.duration",
            format!("must be finite and >= 0, got {}", transition.duration),
        ));
    }
    if let Err(e) = parse_transition(transition) {
        out.push(ValidationError::new(
            entity,
            "transition.params",
            strip_prefix(&e),
        ));
    }

    for el in &scene.elements {
        validate_element(el, scene.duration, out);
    }
}

fn validate_element(el: &Element, scene_duration: f64, out: &mut Vec<ValidationError>) {
    let entity = EntityRef::Element(el.id);
    let mut unit = |field: &str, v: f64| {
        if !v.is_finite() || !(0.0..=1.0).contains(&v) {
            out.push(ValidationError::new(
                entity,
                field,
                format!("must be within [0, 1], got {v}"),
            ));
        }
    };
    unit("position.x", el.position.x);
    unit("position.y", el.position.y);
    unit("size.width", el.size.width);
    unit("size.height", el.size.height);

    if !el.start_time.is_finite() || el.start_time < 0.0 {
        out.push(ValidationError::new(
            entity,
            "start_time",
            format!("must be finite and >= 0, got {}", el.start_time),
        ));
    } else if scene_duration.is_finite() && el.start_time > scene_duration {
        out.push(ValidationError::new(
            entity,
            "start_time",
            format!(
                "{} is beyond the scene duration {scene_duration}",
                el.start_time
            ),
        ));
    }
    if let Some(end) = el.end_time
        && (!end.is_finite() || end < el.start_time)
    {
        out.push(ValidationError::new(
            entity,
            "end_time",
            format!("must be finite and >= start_time {}, got {end}", el.start_time),
        ));
    }

    if !el.volume.is_finite() || el.volume < 0.0 {
        out.push(ValidationError::new(
            entity,
            "volume",
            format!("must be finite and >= 0, got {}", el.volume),
        ));
    }
    if let Some(trim) = el.trim {
        if !trim.start.is_finite() || trim.start < 0.0 {
            out.push(ValidationError::new(
                entity,
                "trim.start",
                format!("must be finite and >= 0, got {}", trim.start),
            ));
        }
        if let Some(end) = trim.end
            && (!end.is_finite() || end <= trim.start)
        {
            out.push(ValidationError::new(
                entity,
                "trim.end",
                format!("must be finite and > trim.start {}, got {end}", trim.start),
            ));
        }
    }

    let has_narration = el
        .narration
        .as_ref()
        .is_some_and(|n| !n.text.trim().is_empty());
    let needs_content = match el.kind {
        ElementKind::Text | ElementKind::Image | ElementKind::Video => true,
        ElementKind::Audio => !has_narration,
        ElementKind::Effect => false,
    };
    if needs_content && el.content.trim().is_empty() {
        out.push(ValidationError::new(
            entity,
            "content",
            format!("{} element requires content", el.kind.as_str()),
        ));
    }

    for (i, effect) in el.effects.iter().enumerate() {
        if let Err(e) = parse_effect(effect) {
            out.push(ValidationError::new(
                entity,
                &format!("effects[{i}].params"),
                strip_prefix(&e),
            ));
        }
    }
}

fn strip_prefix(e: &ReelError) -> String {
    match e {
        ReelError::Validation(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::model::{EffectSpec, Narration, ProjectId, SourceTrim, TransitionSpec};
    use serde_json::json;

    fn scene(id: u64, order: i64, duration: f64, elements: Vec<Element>) -> Scene {
        Scene {
            id: SceneId(id),
            order,
            duration,
            transition: TransitionSpec::none(),
            elements,
        }
    }

    fn project(scenes: Vec<Scene>) -> Project {
        let mut p = Project::new(ProjectId(1), "p");
        p.scenes = scenes;
        p
    }

    #[test]
    fn valid_project_has_no_violations() {
        let p = project(vec![
            scene(
                1,
                0,
                5.0,
                vec![
                    Element::new(ElementId(1), ElementKind::Text, "Hi")
                        .at(0.5, 0.3)
                        .sized(0.5, 0.2)
                        .timed(0.0, Some(5.0)),
                ],
            ),
            scene(2, 1, 10.0, vec![]),
        ]);
        assert!(validate_project(&p).is_empty());
    }

    #[test]
    fn duplicate_orders_are_reported() {
        let p = project(vec![scene(1, 0, 5.0, vec![]), scene(2, 0, 5.0, vec![])]);
        let errs = validate_project(&p);
        assert!(errs.iter().any(|e| e.message.contains("more than once")));
    }

    #[test]
    fn order_gaps_are_reported() {
        let p = project(vec![scene(1, 0, 5.0, vec![]), scene(2, 2, 5.0, vec![])]);
        assert_eq!(validate_project(&p).len(), 1);
    }

    #[test]
    fn start_beyond_scene_fails_but_zero_length_passes() {
        let p = project(vec![scene(
            1,
            0,
            5.0,
            vec![
                Element::new(ElementId(1), ElementKind::Text, "late").timed(6.0, None),
                Element::new(ElementId(2), ElementKind::Text, "blink").timed(2.0, Some(2.0)),
            ],
        )]);
        let errs = validate_project(&p);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].entity, EntityRef::Element(ElementId(1)));
        assert_eq!(errs[0].field, "start_time");
    }

    #[test]
    fn numeric_ranges_and_content_are_checked() {
        let mut bad = Element::new(ElementId(7), ElementKind::Image, "")
            .at(1.5, -0.1)
            .timed(3.0, Some(1.0));
        bad.volume = -1.0;
        bad.trim = Some(SourceTrim {
            start: 2.0,
            end: Some(1.0),
        });
        let mut s = scene(1, 0, 0.0, vec![bad]);
        s.transition = TransitionSpec::new("fade", -1.0);
        let fields: Vec<String> = validate_project(&project(vec![s]))
            .into_iter()
            .map(|e| e.field)
            .collect();
        for f in [
            "duration",
            "transition.duration",
            "position.x",
            "position.y",
            "start_time",
            "end_time",
            "volume",
            "trim.end",
            "content",
        ] {
            assert!(fields.iter().any(|x| x == f), "missing {f} in {fields:?}");
        }
    }

    #[test]
    fn end_time_past_the_scene_is_not_a_violation() {
        let el = Element::new(ElementId(1), ElementKind::Image, "a.png").timed(1.0, Some(9.0));
        assert!(validate_project(&project(vec![scene(1, 0, 5.0, vec![el])])).is_empty());
    }

    #[test]
    fn narrated_audio_needs_no_content() {
        let mut el = Element::new(ElementId(1), ElementKind::Audio, "");
        el.narration = Some(Narration {
            text: "Welcome".to_string(),
            voice: None,
        });
        assert!(validate_project(&project(vec![scene(1, 0, 5.0, vec![el])])).is_empty());
    }

    #[test]
    fn malformed_params_fail_but_unknown_types_pass() {
        let el = Element::new(ElementId(1), ElementKind::Text, "t")
            .with_effect(EffectSpec::new("blur", json!({"radius": "wide"})))
            .with_effect(EffectSpec::new("sparkle", json!({"radius": "wide"})))
            .with_effect(EffectSpec::new("zoom", json!({"scale": -4.0})));
        let errs = validate_project(&project(vec![scene(1, 0, 5.0, vec![el])]));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "effects[0].params");
    }

    #[test]
    fn violations_join_into_validation_error() {
        let p = project(vec![scene(1, 0, 5.0, vec![]), scene(2, 0, 5.0, vec![])]);
        let err = violations_to_error(&validate_project(&p));
        assert!(matches!(err, ReelError::Validation(_)));
        assert!(err.to_string().contains("scenes.order"));
    }
}
