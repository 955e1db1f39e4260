use std::sync::Arc;

use glam::Vec3;
use log::debug;
use parking_lot::RwLock;

use crate::blob::BlobRegistry;
use crate::scene::{
    Collidable, EnvironmentSettings, LightRecord, Orientation, Scene, SceneEntry,
    SceneObjectRecord, TaskRecord,
};

/// Mutation of scene state.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneCommand {
    AddObject(SceneObjectRecord),
    AddLight(LightRecord),
    AddTask(TaskRecord),
    /// Replaces the current environment, or adds one if the scene has none.
    ChangeEnvironment(EnvironmentSettings),
    RemoveObject(String),
    Clear,
}

/// Receiver of scene mutations.
///
/// Code that changes the scene takes a sink explicitly instead of reaching
/// for shared state.
pub trait SceneSink: Send + Sync {
    fn dispatch(&self, command: SceneCommand);
}

/// Replays an imported scene into a sink, record by record.
pub fn load_scene(scene: &Scene, sink: &dyn SceneSink) {
    for entry in &scene.entries {
        let command = match entry {
            SceneEntry::Object(object) => SceneCommand::AddObject(object.clone()),
            SceneEntry::Light(light) => SceneCommand::AddLight(light.clone()),
            SceneEntry::Task(task) => SceneCommand::AddTask(task.clone()),
            SceneEntry::Environment(environment) => {
                SceneCommand::ChangeEnvironment(environment.clone())
            }
        };
        sink.dispatch(command);
    }
}

/// Thread-safe container for the records of the scene being edited.
///
/// Clones share state. Blob handles referenced by removed objects are
/// released through the registry.
#[derive(Debug, Clone)]
pub struct SceneStore {
    entries: Arc<RwLock<Vec<SceneEntry>>>,
    blobs: BlobRegistry,
}

impl SceneStore {
    pub fn new(blobs: BlobRegistry) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            blobs,
        }
    }

    pub fn from_scene(scene: Scene, blobs: BlobRegistry) -> Self {
        Self {
            entries: Arc::new(RwLock::new(scene.entries)),
            blobs,
        }
    }

    /// Returns a snapshot suitable for export.
    pub fn snapshot(&self) -> Scene {
        Scene::new(self.entries.read().clone())
    }

    /// Snapshot for writing to disk or publishing: `link` values that point
    /// at this session's blobs are dropped since they mean nothing elsewhere.
    pub fn export(&self) -> Scene {
        let mut scene = self.snapshot();
        for entry in &mut scene.entries {
            if let SceneEntry::Object(object) = entry {
                if object.link.as_deref().is_some_and(|link| self.blobs.owns(link)) {
                    object.link = None;
                }
            }
        }
        scene
    }

    /// Replaces the whole scene, releasing every handle the old one held.
    pub fn replace(&self, scene: Scene) {
        let old = std::mem::replace(&mut *self.entries.write(), scene.entries);
        self.release(&old);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn objects(&self) -> Vec<SceneObjectRecord> {
        self.snapshot().objects().cloned().collect()
    }

    /// Returns a clone of the requested object.
    pub fn get(&self, asset_identifier: &str) -> Option<SceneObjectRecord> {
        self.entries.read().iter().find_map(|entry| match entry {
            SceneEntry::Object(object) if object.asset_identifier == asset_identifier => {
                Some(object.clone())
            }
            _ => None,
        })
    }

    /// Applies a mutation to the requested object.
    pub fn update<F, R>(&self, asset_identifier: &str, mut updater: F) -> Option<R>
    where
        F: FnMut(&mut SceneObjectRecord) -> R,
    {
        let mut guard = self.entries.write();
        let object = guard.iter_mut().find_map(|entry| match entry {
            SceneEntry::Object(object) if object.asset_identifier == asset_identifier => {
                Some(object)
            }
            _ => None,
        })?;
        Some(updater(object))
    }

    pub fn set_position(&self, asset_identifier: &str, position: Vec3) -> bool {
        self.update(asset_identifier, |obj| obj.position = position)
            .is_some()
    }

    pub fn set_orientation(&self, asset_identifier: &str, orientation: Orientation) -> bool {
        self.update(asset_identifier, |obj| obj.orientation = orientation)
            .is_some()
    }

    pub fn set_scale(&self, asset_identifier: &str, scale: Vec3) -> bool {
        self.update(asset_identifier, |obj| obj.scale = scale)
            .is_some()
    }

    pub fn set_collidable(&self, asset_identifier: &str, collidable: Collidable) -> bool {
        self.update(asset_identifier, |obj| obj.collidable = collidable)
            .is_some()
    }

    pub fn set_fixed(&self, asset_identifier: &str, fixed: bool) -> bool {
        self.update(asset_identifier, |obj| obj.fixed = fixed)
            .is_some()
    }

    fn release(&self, entries: &[SceneEntry]) {
        for entry in entries {
            if let SceneEntry::Object(object) = entry {
                self.release_object(object);
            }
        }
    }

    fn release_object(&self, object: &SceneObjectRecord) {
        let links = object.link.iter().chain(std::iter::once(&object.asset_link));
        for link in links {
            if self.blobs.owns(link) && self.blobs.revoke(link) {
                debug!("released {link} held by {}", object.asset_identifier);
            }
        }
    }
}

impl SceneSink for SceneStore {
    fn dispatch(&self, command: SceneCommand) {
        match command {
            SceneCommand::AddObject(object) => {
                self.entries.write().push(SceneEntry::Object(object));
            }
            SceneCommand::AddLight(light) => {
                self.entries.write().push(SceneEntry::Light(light));
            }
            SceneCommand::AddTask(task) => {
                self.entries.write().push(SceneEntry::Task(task));
            }
            SceneCommand::ChangeEnvironment(environment) => {
                let mut guard = self.entries.write();
                let current = guard
                    .iter()
                    .position(|entry| matches!(entry, SceneEntry::Environment(_)));
                match current {
                    Some(index) => guard[index] = SceneEntry::Environment(environment),
                    None => guard.insert(0, SceneEntry::Environment(environment)),
                }
            }
            SceneCommand::RemoveObject(asset_identifier) => {
                let removed = {
                    let mut guard = self.entries.write();
                    let index = guard.iter().position(|entry| {
                        matches!(entry, SceneEntry::Object(object) if object.asset_identifier == asset_identifier)
                    });
                    index.map(|index| guard.remove(index))
                };
                if let Some(SceneEntry::Object(object)) = removed {
                    self.release_object(&object);
                }
            }
            SceneCommand::Clear => {
                let old = std::mem::take(&mut *self.entries.write());
                self.release(&old);
            }
        }
    }
}
