use std::fmt::Write as _;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::blob::BlobRegistry;
use crate::data_model::{SceneCommand, SceneSink, SceneStore};
use crate::error::{IngestError, ProviderError, TransferError};
use crate::factory::{Clock, ObjectOverrides, SceneObjectFactory, SystemClock};
use crate::fetcher::{ChunkedFetcher, Transfer};
use crate::progress::ProgressSink;
use crate::provider::{AssetReference, StorageProvider};
use crate::scene::{Scene, SceneEntry, SceneObjectRecord};

/// Editor-side glue between the asset vault and the scene being built.
pub struct EditorSession<C: Clock = SystemClock> {
    provider: Arc<dyn StorageProvider>,
    fetcher: ChunkedFetcher,
    blobs: BlobRegistry,
    factory: SceneObjectFactory<C>,
    assets: RwLock<Vec<AssetReference>>,
}

impl EditorSession<SystemClock> {
    pub fn new(provider: Arc<dyn StorageProvider>, fetcher: ChunkedFetcher, blobs: BlobRegistry) -> Self {
        Self::with_factory(provider, fetcher, blobs, SceneObjectFactory::new())
    }
}

impl<C: Clock> EditorSession<C> {
    pub fn with_factory(
        provider: Arc<dyn StorageProvider>,
        fetcher: ChunkedFetcher,
        blobs: BlobRegistry,
        factory: SceneObjectFactory<C>,
    ) -> Self {
        Self {
            provider,
            fetcher,
            blobs,
            factory,
            assets: RwLock::new(Vec::new()),
        }
    }

    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    /// Assets seen by the last refresh.
    pub fn assets(&self) -> Vec<AssetReference> {
        self.assets.read().clone()
    }

    pub async fn refresh_assets(&self) -> Result<Vec<AssetReference>, ProviderError> {
        let assets = self.provider.list_assets().await?;
        info!("vault lists {} asset(s)", assets.len());
        *self.assets.write() = assets.clone();
        Ok(assets)
    }

    /// Streams asset `id` into a local blob and adds an object for it.
    ///
    /// The object's `assetLink` is the remote URL and its `link` the local
    /// handle. Nothing is dispatched when the transfer fails or is cancelled.
    pub async fn download_asset(
        &self,
        id: &str,
        sink: &mut dyn ProgressSink,
        scene: &dyn SceneSink,
        cancel: CancellationToken,
    ) -> Result<SceneObjectRecord, TransferError> {
        let reference = self.reference(id);
        let headers = self.provider.auth_headers();
        let mut transfer =
            Transfer::new(self.fetcher.clone(), self.blobs.clone()).with_cancellation(cancel);
        let handle = transfer.run(&reference.source_url, &headers, sink).await?;

        let record = self.factory.build_object(
            reference.source_url,
            &reference.id,
            Some(ObjectOverrides::local_link(handle.local_url())),
        );
        info!("adding {} to the scene", record.asset_identifier);
        scene.dispatch(SceneCommand::AddObject(record.clone()));
        Ok(record)
    }

    /// Uploads `data`, then ingests the stored file like a download.
    pub async fn upload_asset(
        &self,
        name: &str,
        data: Bytes,
        sink: &mut dyn ProgressSink,
        scene: &dyn SceneSink,
    ) -> Result<SceneObjectRecord, IngestError> {
        let id = self.provider.upload(name, data).await?;
        let mut reference = self.provider.asset_reference(&id);
        reference.name = name.to_string();
        {
            let mut assets = self.assets.write();
            if !assets.iter().any(|asset| asset.id == id) {
                assets.push(reference);
            }
        }
        Ok(self
            .download_asset(&id, sink, scene, CancellationToken::new())
            .await?)
    }

    fn reference(&self, id: &str) -> AssetReference {
        self.assets
            .read()
            .iter()
            .find(|asset| asset.id == id)
            .cloned()
            .unwrap_or_else(|| {
                debug!("asset {id} is not in the last listing");
                self.provider.asset_reference(id)
            })
    }
}

/// One line per record, headed by the object and light counts.
pub fn scene_summary(scene: &Scene) -> String {
    let mut out = format!(
        "Loaded scene with {} objects ({} lights)\n",
        scene.objects().count(),
        scene.lights().count()
    );
    for entry in &scene.entries {
        let _ = writeln!(out, " - {} ({})", entry.asset_identifier(), entry.kind());
    }
    if let Some(environment) = scene.environment() {
        let _ = writeln!(
            out,
            "Environment {}: gravity={:.2} sky={} speed={:.2}",
            environment.asset_identifier,
            environment.gravity,
            environment.sky_color,
            environment.player_speed
        );
    }
    let tasks = scene.task_names();
    if !tasks.is_empty() {
        let _ = writeln!(out, "Tasks: {}", tasks.join(", "));
    }
    out
}

pub fn print_scene_summary(scene: &Scene) {
    print!("{}", scene_summary(scene));
}

pub fn print_final_state(store: &SceneStore) {
    println!("Final object states:");
    for entry in &store.snapshot().entries {
        if let SceneEntry::Object(object) = entry {
            println!(
                " - {} pos=({:.2}, {:.2}, {:.2}) link={}",
                object.asset_identifier,
                object.position.x,
                object.position.y,
                object.position.z,
                object.link.as_deref().unwrap_or(&object.asset_link)
            );
        }
    }
}
