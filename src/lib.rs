//! Asset streaming and scene assembly for the Craft game editor and player.
//!
//! The crate downloads 3D assets from remote storage as chunk streams with
//! progress reporting, turns the bytes into session-local blob handles, and
//! builds the scene records that reference them. Scenes import and export as
//! JSON, can be pinned for publication and played back headlessly. Rendering
//! and physics live outside of the crate so the code stays testable and easy
//! to embed in headless tools.

pub mod app;
pub mod blob;
pub mod config;
pub mod data_model;
pub mod error;
pub mod factory;
pub mod fetcher;
pub mod glb;
pub mod player;
pub mod progress;
pub mod provider;
pub mod publish;
pub mod scene;
pub mod transport;

pub use app::{print_final_state, print_scene_summary, scene_summary, EditorSession};
pub use blob::{BlobAssembler, BlobHandle, BlobRegistry};
pub use config::{PinataConfig, RuntimeConfig, TransferConfig, TuskyConfig};
pub use data_model::{load_scene, SceneCommand, SceneSink, SceneStore};
pub use error::{
    AssemblyError, AssetLoadError, IngestError, PlayerError, ProviderError, PublishError,
    SceneError, TransferError,
};
pub use factory::{Clock, FixedClock, ObjectOverrides, SceneObjectFactory, SystemClock};
pub use fetcher::{download, ChunkStream, ChunkedFetcher, Transfer, TransferState};
pub use glb::{inspect_glb, looks_like_glb, GlbSummary};
pub use player::{AssetFailure, LoadedObject, LoadedWorld, Player};
pub use progress::{LogSink, NoopSink, ProgressSink, TransferProgress};
pub use provider::{AssetReference, StorageProvider, TuskyClient};
pub use publish::{PinataClient, PublishedScene};
pub use scene::{
    Collidable, EnvironmentSettings, LightRecord, Orientation, PlayableWorld, Scene, SceneEntry,
    SceneObjectRecord, TaskRecord,
};
pub use transport::{
    ByteStream, HttpTransport, MemoryResponse, MemoryTransport, Transport, TransportResponse,
};
