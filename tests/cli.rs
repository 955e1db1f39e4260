use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

const SCENE: &str = r##"[
  {"type":"environment","assetIdentifier":"world","gravity":9.81,"sky_color":"#87ceeb"},
  {"type":"object","assetIdentifier":"Cube","assetLink":"https://assets.example/cube.glb",
   "position":{"x":1,"y":2,"z":3},"quaternion":{"x":0,"y":0,"z":0,"w":0}},
  {"type":"light","assetIdentifier":"Sun","position":{"x":0,"y":10,"z":0}},
  {"type":"task","assetIdentifier":"reach the cube"},
  {"type":"camera","assetIdentifier":"ignored"}
]"##;

fn write_temp(contents: &[u8], suffix: &str) -> NamedTempFile {
    let mut tmp = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    tmp.write_all(contents).expect("write temp file");
    tmp
}

fn build_glb(json: &str) -> Vec<u8> {
    let mut json = json.as_bytes().to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut buffer = Vec::new();
    buffer.extend_from_slice(b"glTF");
    buffer.extend_from_slice(&2u32.to_le_bytes());
    buffer.extend_from_slice(&((12 + 8 + json.len()) as u32).to_le_bytes());
    buffer.extend_from_slice(&(json.len() as u32).to_le_bytes());
    buffer.extend_from_slice(b"JSON");
    buffer.extend_from_slice(&json);
    buffer
}

fn craft() -> Command {
    let mut cmd = Command::cargo_bin("craft-runtime").expect("binary exists");
    cmd.env_remove("TUSKY_API_KEY")
        .env_remove("PINATA_JWT")
        .env_remove("CRAFT__TUSKY__API_KEY")
        .env_remove("CRAFT__PINATA__JWT");
    cmd
}

#[test]
fn inspect_prints_scene_summary() {
    let scene = write_temp(SCENE.as_bytes(), ".json");
    craft()
        .arg("inspect")
        .arg(scene.path())
        .assert()
        .success()
        .stdout(contains("Loaded scene with 1 objects (1 lights)"))
        .stdout(contains(" - Cube (object)"))
        .stdout(contains(" - world (environment)"))
        .stdout(contains("Tasks: reach the cube"));
}

#[test]
fn inspect_reports_glb_contents() {
    let model = write_temp(
        &build_glb(r#"{"asset":{"version":"2.0","generator":"cli-test"},"meshes":[{}],"nodes":[{},{}]}"#),
        ".glb",
    );
    craft()
        .arg("inspect")
        .arg(model.path())
        .assert()
        .success()
        .stdout(contains("1 mesh(es), 2 node(s)"))
        .stdout(contains("bin=none"))
        .stdout(contains("Generator: cli-test"));
}

#[test]
fn inspect_rejects_malformed_scene() {
    let scene = write_temp(b"[{\"type\":\"object\"", ".json");
    craft()
        .arg("inspect")
        .arg(scene.path())
        .assert()
        .failure()
        .code(1)
        .stderr(contains("Error:"))
        .stderr(contains("failed to parse scene JSON"));
}

#[test]
fn assets_requires_api_key() {
    craft()
        .arg("assets")
        .assert()
        .failure()
        .stderr(contains("missing credentials"));
}

#[test]
fn publish_requires_jwt() {
    let scene = write_temp(SCENE.as_bytes(), ".json");
    craft()
        .arg("publish")
        .arg(scene.path())
        .assert()
        .failure()
        .stderr(contains("pinata jwt"));
}

#[test]
fn play_loads_scene_without_objects() {
    let scene = write_temp(
        br#"[{"type":"environment","assetIdentifier":"empty","gravity":3.5},
            {"type":"light","assetIdentifier":"lamp"}]"#,
        ".json",
    );
    craft()
        .arg("play")
        .arg(scene.path())
        .assert()
        .success()
        .stdout(contains("Loaded world with 0 objects (1 lights)"))
        .stdout(contains("gravity=(0.00, -3.50, 0.00)"));
}

#[test]
fn config_file_is_honoured() {
    let config = write_temp(b"[tusky]\nbase_url = \"http://127.0.0.1:9\"\n", ".toml");
    craft()
        .arg("--config")
        .arg(config.path())
        .arg("assets")
        .assert()
        .failure()
        .stderr(contains("missing credentials"));
}
