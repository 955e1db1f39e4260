use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use log::{error, info};
use tokio_util::sync::CancellationToken;

use craft_runtime::{
    inspect_glb, looks_like_glb, print_final_state, print_scene_summary, BlobHandle,
    BlobRegistry, ChunkedFetcher, EditorSession, LoadedWorld, PinataClient, Player,
    ProgressSink, RuntimeConfig, Scene, SceneObjectRecord, SceneStore, StorageProvider,
    TransferError, TransferProgress, TuskyClient,
};

#[derive(Parser)]
#[command(name = "craft-runtime")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stream game assets, assemble scenes and play them headlessly", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Tusky API key (overrides the configuration)
    #[arg(long, env = "TUSKY_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Tusky API root (overrides the configuration)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a scene file or a GLB model
    Inspect {
        /// Scene JSON or .glb file
        path: PathBuf,
    },

    /// List the assets stored in the vault
    Assets,

    /// Download an asset and add it to a scene
    Fetch {
        /// File id in the vault
        id: String,

        /// Scene file to add the object to (created if missing)
        #[arg(short, long)]
        scene: Option<PathBuf>,

        /// Write the downloaded bytes to this path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Upload a model to the vault and add it to a scene
    Upload {
        /// Model file
        file: PathBuf,

        /// Scene file to add the object to (created if missing)
        #[arg(short, long)]
        scene: Option<PathBuf>,
    },

    /// Load a scene and every model it references
    Play {
        /// Scene path or URL
        source: String,

        /// Maximum downloads in flight
        #[arg(short = 'j', long)]
        jobs: Option<usize>,
    },

    /// Pin a scene to IPFS
    Publish {
        /// Scene JSON file
        path: PathBuf,

        /// Pinata JWT (overrides the configuration)
        #[arg(long, env = "PINATA_JWT", hide_env_values = true)]
        jwt: Option<String>,
    },
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        error!("{err:#}");
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config =
        RuntimeConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(api_key) = cli.api_key {
        config.tusky.api_key = Some(api_key);
    }
    if let Some(base_url) = cli.base_url {
        config.tusky.base_url = base_url;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(dispatch(cli.command, config))
}

async fn dispatch(command: Commands, mut config: RuntimeConfig) -> Result<()> {
    match command {
        Commands::Inspect { path } => inspect(&path),
        Commands::Assets => list_assets(&config).await,
        Commands::Fetch { id, scene, out } => {
            fetch(&config, &id, scene.as_deref(), out.as_deref()).await
        }
        Commands::Upload { file, scene } => upload(&config, &file, scene.as_deref()).await,
        Commands::Play { source, jobs } => {
            if let Some(jobs) = jobs {
                config.transfer.max_concurrent_downloads = jobs;
            }
            play(&config, &source).await
        }
        Commands::Publish { path, jwt } => {
            if jwt.is_some() {
                config.pinata.jwt = jwt;
            }
            publish(&config, &path).await
        }
    }
}

fn inspect(path: &Path) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if looks_like_glb(&data) {
        let summary =
            inspect_glb(&data).with_context(|| format!("invalid GLB {}", path.display()))?;
        println!(
            "GLB v{} ({} bytes): {} mesh(es), {} node(s), json={} bytes, bin={}",
            summary.version,
            summary.total_length,
            summary.mesh_count,
            summary.node_count,
            summary.json_length,
            summary
                .binary_length
                .map_or_else(|| "none".to_string(), |len| format!("{len} bytes"))
        );
        if let Some(generator) = summary.generator {
            println!("Generator: {generator}");
        }
        return Ok(());
    }

    let json = String::from_utf8(data).context("scene file is not UTF-8")?;
    let scene = Scene::from_json(&json).context("failed to parse scene JSON")?;
    print_scene_summary(&scene);
    Ok(())
}

fn tusky(config: &RuntimeConfig) -> Result<Arc<TuskyClient>> {
    Ok(Arc::new(
        TuskyClient::new(&config.tusky).context("failed to configure storage provider")?,
    ))
}

async fn list_assets(config: &RuntimeConfig) -> Result<()> {
    let provider = tusky(config)?;
    let assets = provider.list_assets().await.context("failed to list assets")?;
    println!("{} asset(s) in {}", assets.len(), provider.vault_name());
    for asset in assets {
        println!(" - {} {} ({})", asset.id, asset.name, asset.source_url);
    }
    Ok(())
}

fn open_store(path: Option<&Path>, blobs: &BlobRegistry) -> Result<SceneStore> {
    let scene = match path {
        Some(path) if path.exists() => Scene::from_path(path)
            .with_context(|| format!("failed to read scene {}", path.display()))?,
        _ => Scene::default(),
    };
    Ok(SceneStore::from_scene(scene, blobs.clone()))
}

fn save_store(path: Option<&Path>, store: &SceneStore) -> Result<()> {
    if let Some(path) = path {
        store
            .export()
            .write_path(path)
            .with_context(|| format!("failed to write scene {}", path.display()))?;
        println!("Saved {} record(s) to {}", store.len(), path.display());
    }
    print_final_state(store);
    Ok(())
}

/// Cancels the returned token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, abandoning transfer");
            token.cancel();
        }
    });
    cancel
}

async fn fetch(
    config: &RuntimeConfig,
    id: &str,
    scene: Option<&Path>,
    out: Option<&Path>,
) -> Result<()> {
    let blobs = BlobRegistry::new();
    let session = EditorSession::new(tusky(config)?, ChunkedFetcher::default(), blobs.clone());
    let store = open_store(scene, &blobs)?;

    let mut sink = ConsoleSink::new(id);
    let record = session
        .download_asset(id, &mut sink, &store, cancel_on_interrupt())
        .await
        .with_context(|| format!("failed to download asset {id}"))?;

    if let Some(out) = out {
        write_blob(&blobs, &record, out)?;
    }
    save_store(scene, &store)
}

async fn upload(config: &RuntimeConfig, file: &Path, scene: Option<&Path>) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", file.display()))?
        .to_string();

    let blobs = BlobRegistry::new();
    let session = EditorSession::new(tusky(config)?, ChunkedFetcher::default(), blobs.clone());
    let store = open_store(scene, &blobs)?;

    let mut sink = ConsoleSink::new(&name);
    let record = session
        .upload_asset(&name, Bytes::from(data), &mut sink, &store)
        .await
        .with_context(|| format!("failed to upload {name}"))?;
    println!("Uploaded {name} as {}", record.asset_link);
    save_store(scene, &store)
}

fn write_blob(blobs: &BlobRegistry, record: &SceneObjectRecord, out: &Path) -> Result<()> {
    let link = record
        .link
        .as_deref()
        .ok_or_else(|| anyhow!("{} has no local copy", record.asset_identifier))?;
    let data = blobs
        .resolve(link)
        .ok_or_else(|| anyhow!("blob {link} was released"))?;
    fs::write(out, &data).with_context(|| format!("failed to write {}", out.display()))?;
    println!("Wrote {} bytes to {}", data.len(), out.display());
    Ok(())
}

async fn play(config: &RuntimeConfig, source: &str) -> Result<()> {
    let mut player = Player::new(ChunkedFetcher::default(), BlobRegistry::new())
        .with_max_concurrent(config.transfer.max_concurrent_downloads);
    if config.tusky.api_key.is_some() {
        player = player.with_headers(tusky(config)?.auth_headers());
    }

    let world = player
        .load(source, |record| ConsoleSink::new(&record.asset_identifier))
        .await
        .with_context(|| format!("failed to load scene {source}"))?;
    print_world(&world);
    if world.objects.is_empty() && !world.failures.is_empty() {
        return Err(anyhow!(
            "none of the {} asset(s) could be loaded",
            world.failures.len()
        ));
    }
    Ok(())
}

fn print_world(world: &LoadedWorld) {
    println!(
        "Loaded world with {} objects ({} lights)",
        world.objects.len(),
        world.lights.len()
    );
    if let Some(environment) = &world.environment {
        let gravity = environment.gravity_vector();
        println!(
            "Environment {}: gravity=({:.2}, {:.2}, {:.2}) sky={}",
            environment.asset_identifier, gravity.x, gravity.y, gravity.z, environment.sky_color
        );
    }
    for object in &world.objects {
        let model = object.glb.as_ref().map_or_else(
            || "unrecognized model".to_string(),
            |glb| format!("{} mesh(es), {} node(s)", glb.mesh_count, glb.node_count),
        );
        println!(
            " - {} {} bytes, {model}, scale=({:.2}, {:.2}, {:.2})",
            object.record.asset_identifier,
            object.handle.len(),
            object.scale.x,
            object.scale.y,
            object.scale.z
        );
    }
    for failure in &world.failures {
        println!(" ! {} failed: {}", failure.asset_identifier, failure.error);
    }
    if !world.tasks.is_empty() {
        println!("Tasks: {}", world.tasks.join(", "));
    }
}

async fn publish(config: &RuntimeConfig, path: &Path) -> Result<()> {
    let scene = Scene::from_path(path)
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    let client =
        PinataClient::new(&config.pinata).context("failed to configure pinning service")?;
    let published = client
        .pin_scene(&scene)
        .await
        .context("failed to publish scene")?;
    println!("Published {} as {}", path.display(), published.ipfs_hash);
    println!("{}", published.url);
    let tasks = scene.task_names();
    if !tasks.is_empty() {
        println!("Tasks: {}", tasks.join(", "));
    }
    Ok(())
}

/// Progress lines on stderr, one per percent step, or a byte count when the
/// length is unknown.
struct ConsoleSink {
    label: String,
    last_percent: Option<u8>,
}

impl ConsoleSink {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            last_percent: None,
        }
    }

    fn progress_line(&mut self, progress: TransferProgress) -> Option<String> {
        let Some(percent) = progress.percent() else {
            return Some(format!("{}: {} bytes", self.label, progress.bytes_received));
        };
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(format!("{}: {percent}%", self.label))
    }
}

impl ProgressSink for ConsoleSink {
    fn on_progress(&mut self, progress: TransferProgress) {
        if let Some(line) = self.progress_line(progress) {
            let _ = writeln!(io::stderr(), "{line}");
        }
    }

    fn on_complete(&mut self, handle: &BlobHandle) {
        let _ = writeln!(io::stderr(), "{}: done ({} bytes)", self.label, handle.len());
    }

    fn on_error(&mut self, error: &TransferError) {
        let _ = writeln!(io::stderr(), "{}: {error}", self.label);
    }
}
