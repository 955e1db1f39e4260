//! Headless scene player.
//!
//! Opens a published scene from disk or over the network, downloads every
//! object's model with a bounded number of transfers in flight and checks
//! the payloads before handing the world to a runtime.

use std::path::Path;

use futures::stream::{self, StreamExt};
use glam::Vec3;
use log::{debug, info, warn};
use reqwest::header::HeaderMap;

use crate::blob::{BlobHandle, BlobRegistry};
use crate::error::{AssetLoadError, PlayerError};
use crate::fetcher::{download, ChunkedFetcher};
use crate::glb::{inspect_glb, looks_like_glb, GlbSummary};
use crate::progress::{NoopSink, ProgressSink};
use crate::scene::{EnvironmentSettings, LightRecord, Scene, SceneObjectRecord};

/// An object whose model is available locally.
#[derive(Debug, Clone)]
pub struct LoadedObject {
    pub record: SceneObjectRecord,
    pub handle: BlobHandle,
    /// Present when the payload is a binary glTF.
    pub glb: Option<GlbSummary>,
    /// `scale * scaleFactor`.
    pub scale: Vec3,
}

#[derive(Debug)]
pub struct AssetFailure {
    pub asset_identifier: String,
    pub url: String,
    pub error: AssetLoadError,
}

/// Everything a runtime needs to start a scene.
#[derive(Debug, Default)]
pub struct LoadedWorld {
    pub environment: Option<EnvironmentSettings>,
    pub lights: Vec<LightRecord>,
    pub objects: Vec<LoadedObject>,
    pub tasks: Vec<String>,
    pub failures: Vec<AssetFailure>,
}

impl LoadedWorld {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Player {
    fetcher: ChunkedFetcher,
    blobs: BlobRegistry,
    headers: HeaderMap,
    max_concurrent: usize,
}

impl Player {
    pub fn new(fetcher: ChunkedFetcher, blobs: BlobRegistry) -> Self {
        Self {
            fetcher,
            blobs,
            headers: HeaderMap::new(),
            max_concurrent: 4,
        }
    }

    /// Headers attached to every asset request (the provider's `Api-Key`).
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    /// Reads a scene from a local path or a URL.
    pub async fn read_scene(&self, source: &str) -> Result<Scene, PlayerError> {
        if !is_url(source) {
            return Ok(Scene::from_path(Path::new(source))?);
        }
        let handle = download(
            &self.fetcher,
            &self.blobs,
            source,
            &HeaderMap::new(),
            &mut NoopSink,
        )
        .await?;
        let bytes = self.blobs.resolve(handle.local_url()).unwrap_or_default();
        self.blobs.revoke(handle.local_url());
        Ok(Scene::from_json(std::str::from_utf8(&bytes)?)?)
    }

    /// Reads `source` and loads everything it references.
    ///
    /// `sink_factory` is called once per object to observe its download.
    pub async fn load<F, S>(&self, source: &str, sink_factory: F) -> Result<LoadedWorld, PlayerError>
    where
        F: FnMut(&SceneObjectRecord) -> S,
        S: ProgressSink,
    {
        let scene = self.read_scene(source).await?;
        Ok(self.load_scene(&scene, sink_factory).await)
    }

    /// Downloads the models of `scene`. Per-object failures are collected
    /// rather than aborting the load.
    pub async fn load_scene<F, S>(&self, scene: &Scene, mut sink_factory: F) -> LoadedWorld
    where
        F: FnMut(&SceneObjectRecord) -> S,
        S: ProgressSink,
    {
        let world = scene.world();
        info!(
            "loading {} object(s), {} light(s), {} at a time",
            world.objects.len(),
            world.lights.len(),
            self.max_concurrent
        );

        let jobs = world.objects.into_iter().map(|record| {
            let sink = sink_factory(&record);
            self.load_object(record, sink)
        });
        let results: Vec<_> = stream::iter(jobs)
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut loaded = LoadedWorld {
            environment: world.environment,
            lights: world.lights,
            tasks: scene.task_names(),
            ..LoadedWorld::default()
        };
        for result in results {
            match result {
                Ok(object) => loaded.objects.push(object),
                Err(failure) => {
                    warn!(
                        "could not load {} from {}: {}",
                        failure.asset_identifier, failure.url, failure.error
                    );
                    loaded.failures.push(failure);
                }
            }
        }
        loaded
    }

    async fn load_object<S: ProgressSink>(
        &self,
        record: SceneObjectRecord,
        mut sink: S,
    ) -> Result<LoadedObject, AssetFailure> {
        let url = record.asset_link.clone();
        let fail = |error: AssetLoadError| AssetFailure {
            asset_identifier: record.asset_identifier.clone(),
            url: url.clone(),
            error,
        };

        let handle = download(&self.fetcher, &self.blobs, &url, &self.headers, &mut sink)
            .await
            .map_err(|err| fail(err.into()))?;

        let bytes = self.blobs.resolve(handle.local_url()).unwrap_or_default();
        let glb = if looks_like_glb(&bytes) {
            match inspect_glb(&bytes) {
                Ok(summary) => Some(summary),
                Err(err) => {
                    self.blobs.revoke(handle.local_url());
                    return Err(fail(AssetLoadError::InvalidModel(err)));
                }
            }
        } else {
            debug!("{} is not a binary glTF", record.asset_identifier);
            None
        };

        let scale = record.effective_scale();
        Ok(LoadedObject {
            record,
            handle,
            glb,
            scale,
        })
    }
}

fn is_url(source: &str) -> bool {
    source.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}
