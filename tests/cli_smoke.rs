use std::path::PathBuf;

use reelforge::{Element, ElementId, ElementKind, Project, ProjectId, Scene, SceneId, TransitionSpec};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_reelforge")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "reelforge.exe"
            } else {
                "reelforge"
            });
            p
        })
}

fn write_project(dir: &std::path::Path, name: &str, order_b: i64) -> PathBuf {
    let mut project = Project::new(ProjectId(1), "cli");
    project.script = "Hello".to_string();
    project.scenes = vec![
        Scene {
            id: SceneId(1),
            order: 0,
            duration: 2.0,
            transition: TransitionSpec::none(),
            elements: vec![Element::new(ElementId(1), ElementKind::Text, "One")],
        },
        Scene {
            id: SceneId(2),
            order: order_b,
            duration: 2.0,
            transition: TransitionSpec::new("fade", 0.5),
            elements: vec![Element::new(ElementId(2), ElementKind::Text, "Two")],
        },
    ];
    let path = dir.join(name);
    let f = std::fs::File::create(&path).unwrap();
    serde_json::to_writer_pretty(f, &project).unwrap();
    path
}

#[test]
fn cli_validate_reports_duplicate_order() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    let good = write_project(&dir, "good.json", 1);
    let bad = write_project(&dir, "bad.json", 0);

    let ok = std::process::Command::new(exe())
        .args(["validate", "--in"])
        .arg(&good)
        .status()
        .unwrap();
    assert!(ok.success());

    let out = std::process::Command::new(exe())
        .args(["validate", "--in"])
        .arg(&bad)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("scenes.order"));
}

#[test]
fn cli_applies_and_exports_templates() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    let project = write_project(&dir, "templated.json", 1);
    let applied = dir.join("applied.json");
    let exported = dir.join("exported_template.json");

    let status = std::process::Command::new(exe())
        .args(["apply-template", "--template", "Promotional", "--in"])
        .arg(&project)
        .arg("--out")
        .arg(&applied)
        .status()
        .unwrap();
    assert!(status.success());
    let p: Project = serde_json::from_str(&std::fs::read_to_string(&applied).unwrap()).unwrap();
    assert_eq!(p.template.as_deref(), Some("Promotional"));
    assert_eq!(p.scenes.len(), 2);

    let status = std::process::Command::new(exe())
        .args(["export-template", "--name", "Mine", "--in"])
        .arg(&applied)
        .arg("--out")
        .arg(&exported)
        .status()
        .unwrap();
    assert!(status.success());
    let t = reelforge::Template::from_path(&exported).unwrap();
    assert_eq!(t.name, "Mine");
    assert_eq!(t.structure.scenes.len(), 2);

    let listed = std::process::Command::new(exe())
        .arg("templates")
        .output()
        .unwrap();
    assert!(listed.status.success());
    let stdout = String::from_utf8_lossy(&listed.stdout);
    assert!(stdout.contains("Promotional") && stdout.contains("Educational"));
}
