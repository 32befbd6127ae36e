use reelforge::{
    EffectSpec, Element, ElementId, ElementKind, ProjectStore, Scene, SceneId, Template,
    TemplateStructure, TransitionSpec, find_builtin, validate_project,
};

fn authored_scenes() -> Vec<Scene> {
    vec![
        Scene {
            id: SceneId(1),
            order: 0,
            duration: 4.0,
            transition: TransitionSpec::none(),
            elements: vec![
                Element::new(ElementId(1), ElementKind::Image, "hero.png"),
                Element::new(ElementId(2), ElementKind::Text, "Hello")
                    .at(0.1, 0.7)
                    .sized(0.8, 0.2)
                    .timed(0.5, Some(3.5))
                    .with_effect(EffectSpec::new(
                        "fade_in",
                        serde_json::json!({ "duration": 0.5 }),
                    )),
            ],
        },
        Scene {
            id: SceneId(2),
            order: 1,
            duration: 6.0,
            transition: TransitionSpec::new("slide", 1.0)
                .with_params(serde_json::json!({ "direction": "right" })),
            elements: vec![Element::new(ElementId(3), ElementKind::Audio, "music.mp3")],
        },
    ]
}

#[test]
fn applying_a_template_twice_is_idempotent() {
    let store = ProjectStore::new();
    let id = store.create("twice").id;
    let template = find_builtin("Educational").unwrap();

    store.apply_template(id, &template).unwrap();
    let first = store.get(id).unwrap();
    store.apply_template(id, &template).unwrap();
    let second = store.get(id).unwrap();

    assert_eq!(
        TemplateStructure::from_scenes(first.ordered_scenes()),
        TemplateStructure::from_scenes(second.ordered_scenes())
    );
    assert_eq!(first.scenes.len(), second.scenes.len());
    assert_eq!(second.template.as_deref(), Some("Educational"));
    assert!(validate_project(&second).is_empty());
}

#[test]
fn export_then_apply_reconstructs_the_timeline() {
    let store = ProjectStore::new();
    let source = store.create("source").id;
    store
        .update_draft(source, |p| p.scenes = authored_scenes())
        .unwrap();
    let original = store.get(source).unwrap();

    let json = Template::export(&original, "Roundtrip")
        .to_json_pretty()
        .unwrap();
    let template = Template::from_json_str(&json).unwrap();

    let target = store.create("target").id;
    store.apply_template(target, &template).unwrap();
    let rebuilt = store.get(target).unwrap();

    assert_eq!(
        TemplateStructure::from_scenes(original.ordered_scenes()),
        TemplateStructure::from_scenes(rebuilt.ordered_scenes())
    );
    let orders: Vec<i64> = rebuilt.ordered_scenes().iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![0, 1]);

    // Materialized ids never collide with ids already handed out.
    let mut ids: Vec<u64> = original
        .scenes
        .iter()
        .flat_map(|s| s.elements.iter().map(|e| e.id.0))
        .chain(
            rebuilt
                .scenes
                .iter()
                .flat_map(|s| s.elements.iter().map(|e| e.id.0)),
        )
        .collect();
    let n = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), n);
}

#[test]
fn catalog_json_with_null_transition_loads() {
    let json = r#"{
        "name": "Catalog",
        "category": "PROMO",
        "json_structure": {
            "scenes": [
                {"duration": 3, "transition": null, "elements": [
                    {"type": "text", "content": "Hi", "position": {"x": 0.2, "y": 0.2},
                     "size": {"width": 0.5, "height": 0.2}}
                ]}
            ]
        }
    }"#;
    let template = Template::from_json_str(json).unwrap();
    assert!(template.structure.scenes[0].transition.is_none());

    let store = ProjectStore::new();
    let id = store.create("catalog").id;
    store.apply_template(id, &template).unwrap();
    assert_eq!(store.get(id).unwrap().element_count(), 1);
}
