use std::fs;
use std::path::Path;

use glam::{Mat4, Quat, Vec3};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::SceneError;

/// Exported scene: a JSON array of records tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Scene {
    pub entries: Vec<SceneEntry>,
}

impl Scene {
    pub fn new(entries: Vec<SceneEntry>) -> Self {
        Self { entries }
    }

    /// Parses an exported scene. Records with an unknown `type` are skipped.
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let raw: Vec<Value> = serde_json::from_str(json)?;
        let mut entries = Vec::with_capacity(raw.len());
        for value in raw {
            let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
            if !SceneEntry::KINDS.contains(&kind) {
                warn!("skipping scene record of unknown type {kind:?}");
                continue;
            }
            entries.push(serde_json::from_value(value)?);
        }
        Ok(Self { entries })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_path(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn objects(&self) -> impl Iterator<Item = &SceneObjectRecord> {
        self.entries.iter().filter_map(|entry| match entry {
            SceneEntry::Object(object) => Some(object),
            _ => None,
        })
    }

    pub fn lights(&self) -> impl Iterator<Item = &LightRecord> {
        self.entries.iter().filter_map(|entry| match entry {
            SceneEntry::Light(light) => Some(light),
            _ => None,
        })
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.entries.iter().filter_map(|entry| match entry {
            SceneEntry::Task(task) => Some(task),
            _ => None,
        })
    }

    /// Environment settings; when several are present the last one wins.
    pub fn environment(&self) -> Option<&EnvironmentSettings> {
        self.entries.iter().rev().find_map(|entry| match entry {
            SceneEntry::Environment(environment) => Some(environment),
            _ => None,
        })
    }

    /// Task names, in scene order, as registered when a game is published.
    pub fn task_names(&self) -> Vec<String> {
        self.tasks()
            .map(|task| task.asset_identifier.clone())
            .collect()
    }

    /// Splits the scene into what a player needs to run it.
    pub fn world(&self) -> PlayableWorld {
        let mut objects: Vec<SceneObjectRecord> = Vec::new();
        for object in self.objects() {
            if objects
                .iter()
                .any(|known| known.asset_identifier == object.asset_identifier)
            {
                continue;
            }
            objects.push(object.clone());
        }
        PlayableWorld {
            environment: self.environment().cloned(),
            lights: self.lights().cloned().collect(),
            objects,
        }
    }
}

/// Scene classified into environment, lights and unique objects.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayableWorld {
    pub environment: Option<EnvironmentSettings>,
    pub lights: Vec<LightRecord>,
    pub objects: Vec<SceneObjectRecord>,
}

/// One record of an exported scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SceneEntry {
    Object(SceneObjectRecord),
    Light(LightRecord),
    Task(TaskRecord),
    Environment(EnvironmentSettings),
}

impl SceneEntry {
    pub const KINDS: [&'static str; 4] = ["object", "light", "task", "environment"];

    /// Value of the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::Light(_) => "light",
            Self::Task(_) => "task",
            Self::Environment(_) => "environment",
        }
    }

    pub fn asset_identifier(&self) -> &str {
        match self {
            Self::Object(object) => &object.asset_identifier,
            Self::Light(light) => &light.asset_identifier,
            Self::Task(task) => &task.asset_identifier,
            Self::Environment(environment) => &environment.asset_identifier,
        }
    }
}

/// Physics collider requested for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collidable {
    #[default]
    No,
    Yes,
    Box,
    Hull,
    Trimesh,
}

/// Orientation of a placed object.
///
/// Scenes written by older editors carry a zero quaternion for objects that
/// were never rotated. That value is not a rotation, so it is kept as
/// `Unset` and written back unchanged; it resolves to identity when a
/// rotation is needed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Orientation {
    #[default]
    Unset,
    Rotation(Quat),
}

impl Orientation {
    pub const IDENTITY: Self = Self::Rotation(Quat::IDENTITY);

    pub fn from_xyzw(x: f32, y: f32, z: f32, w: f32) -> Self {
        if x == 0.0 && y == 0.0 && z == 0.0 && w == 0.0 {
            Self::Unset
        } else {
            Self::Rotation(Quat::from_xyzw(x, y, z, w))
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn resolve(&self) -> Quat {
        match self {
            Self::Unset => Quat::IDENTITY,
            Self::Rotation(rotation) => *rotation,
        }
    }

    fn components(&self) -> [f32; 4] {
        match self {
            Self::Unset => [0.0; 4],
            Self::Rotation(rotation) => rotation.to_array(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Xyzw {
    x: f32,
    y: f32,
    z: f32,
    w: f32,
}

impl Serialize for Orientation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let [x, y, z, w] = self.components();
        Xyzw { x, y, z, w }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Orientation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Xyzw { x, y, z, w } = Xyzw::deserialize(deserializer)?;
        Ok(Self::from_xyzw(x, y, z, w))
    }
}

/// Placed 3D asset (`type: "object"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneObjectRecord {
    pub asset_identifier: String,
    pub asset_link: String,
    /// Session-local blob URL of the downloaded asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, with = "xyz")]
    pub position: Vec3,
    #[serde(rename = "quaternion", default)]
    pub orientation: Orientation,
    #[serde(default = "unit_scale", with = "xyz")]
    pub scale: Vec3,
    #[serde(default = "identity_matrix", with = "matrix")]
    pub world_matrix: Mat4,
    #[serde(rename = "colliders", alias = "collision", default)]
    pub collidable: Collidable,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default = "one")]
    pub mass: f32,
    #[serde(default = "one")]
    pub scale_factor: f32,
    #[serde(rename = "OnClick", default)]
    pub on_click: String,
    #[serde(rename = "OnHover", default)]
    pub on_hover: String,
    #[serde(rename = "OnCollision", default)]
    pub on_collision: String,
    /// Keys this crate does not interpret, kept for the round trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SceneObjectRecord {
    /// Record with schema defaults: origin, identity orientation, unit scale.
    pub fn new(asset_identifier: impl Into<String>, asset_link: impl Into<String>) -> Self {
        Self {
            asset_identifier: asset_identifier.into(),
            asset_link: asset_link.into(),
            link: None,
            position: Vec3::ZERO,
            orientation: Orientation::IDENTITY,
            scale: unit_scale(),
            world_matrix: identity_matrix(),
            collidable: Collidable::No,
            fixed: false,
            mass: one(),
            scale_factor: one(),
            on_click: String::new(),
            on_hover: String::new(),
            on_collision: String::new(),
            extra: Map::new(),
        }
    }

    /// Scale with the per-object scale factor applied.
    pub fn effective_scale(&self) -> Vec3 {
        self.scale * self.scale_factor
    }
}

/// Point light (`type: "light"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightRecord {
    pub asset_identifier: String,
    #[serde(default, with = "xyz")]
    pub position: Vec3,
    #[serde(default = "one")]
    pub intensity: f32,
    #[serde(default = "default_light_color")]
    pub color: String,
}

/// Task marker (`type: "task"`); the identifier is the task name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub asset_identifier: String,
}

/// World settings (`type: "environment"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    #[serde(rename = "assetIdentifier")]
    pub asset_identifier: String,
    /// Magnitude of downward gravity.
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    #[serde(default = "default_sky_color")]
    pub sky_color: String,
    #[serde(default = "default_ambient_light")]
    pub ambient_light: f32,
    #[serde(default = "default_player_speed")]
    pub player_speed: f32,
    #[serde(default = "one")]
    pub player_mass: f32,
    #[serde(default = "one")]
    pub player_size: f32,
    #[serde(default = "default_player_jump")]
    pub player_jump: f32,
    #[serde(default)]
    pub player_flycontrol: bool,
    #[serde(default)]
    pub stars: bool,
    #[serde(default)]
    pub env_music: String,
    #[serde(default)]
    pub player_music: String,
}

impl EnvironmentSettings {
    pub fn new(asset_identifier: impl Into<String>) -> Self {
        Self {
            asset_identifier: asset_identifier.into(),
            gravity: default_gravity(),
            sky_color: default_sky_color(),
            ambient_light: default_ambient_light(),
            player_speed: default_player_speed(),
            player_mass: one(),
            player_size: one(),
            player_jump: default_player_jump(),
            player_flycontrol: false,
            stars: false,
            env_music: String::new(),
            player_music: String::new(),
        }
    }

    /// Gravity as a vector for a Y-up world.
    pub fn gravity_vector(&self) -> Vec3 {
        Vec3::new(0.0, -self.gravity, 0.0)
    }
}

fn one() -> f32 {
    1.0
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

fn identity_matrix() -> Mat4 {
    Mat4::IDENTITY
}

fn default_light_color() -> String {
    "#ffffff".to_string()
}

fn default_gravity() -> f32 {
    9.81
}

fn default_sky_color() -> String {
    "#000000".to_string()
}

fn default_ambient_light() -> f32 {
    0.5
}

fn default_player_speed() -> f32 {
    5.0
}

fn default_player_jump() -> f32 {
    5.0
}

/// `Vec3` as `{ "x": .., "y": .., "z": .. }`.
mod xyz {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Xyz {
        x: f32,
        y: f32,
        z: f32,
    }

    pub fn serialize<S: Serializer>(value: &Vec3, serializer: S) -> Result<S::Ok, S::Error> {
        Xyz {
            x: value.x,
            y: value.y,
            z: value.z,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec3, D::Error> {
        let Xyz { x, y, z } = Xyz::deserialize(deserializer)?;
        Ok(Vec3::new(x, y, z))
    }
}

/// `Mat4` as `{ "elements": [16 column-major floats] }`.
mod matrix {
    use glam::Mat4;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Elements {
        elements: [f32; 16],
    }

    pub fn serialize<S: Serializer>(value: &Mat4, serializer: S) -> Result<S::Ok, S::Error> {
        Elements {
            elements: value.to_cols_array(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mat4, D::Error> {
        let Elements { elements } = Elements::deserialize(deserializer)?;
        Ok(Mat4::from_cols_array(&elements))
    }
}
