use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use craft_runtime::{
    download, BlobRegistry, ChunkedFetcher, HttpTransport, PinataClient, PinataConfig,
    ProgressSink, PublishError, Scene, SceneEntry, SceneObjectRecord, StorageProvider,
    SystemClock, TransferError, TransferProgress, TuskyClient, TuskyConfig,
};

#[derive(Clone)]
struct Reply {
    status: u16,
    body: Vec<u8>,
    /// Number of separate frames the body is streamed in.
    pieces: usize,
    /// Announced length when it differs from the body.
    declared_length: Option<usize>,
}

impl Reply {
    fn json(body: &str) -> Self {
        Self::bytes(body.as_bytes().to_vec())
    }

    fn bytes(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            body,
            pieces: 1,
            declared_length: None,
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::bytes(Vec::new())
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let length = self.declared_length.unwrap_or(self.body.len());
        // A body shorter than its announced length is cut off with an error,
        // which drops the connection mid-response.
        let cut_short = length > self.body.len();
        let piece = self.body.len().div_ceil(self.pieces.max(1)).max(1);
        let frames: Vec<Bytes> = self.body.chunks(piece).map(Bytes::copy_from_slice).collect();
        let body = stream::iter(frames)
            .then(|frame| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, io::Error>(frame)
            })
            .chain(stream::iter(cut_short.then(|| {
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "closed early"))
            })));

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, length.to_string())
            .body(Body::from_stream(body))
            .unwrap()
    }
}

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    target: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

#[derive(Clone)]
struct Canned {
    routes: Arc<HashMap<&'static str, Reply>>,
    log: Log,
}

async fn answer(
    State(canned): State<Canned>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);
    let key = format!("{method} {target}");
    canned.log.lock().push(Recorded {
        method: method.to_string(),
        target,
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                Some((name.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect(),
        body: body.to_vec(),
    });

    canned
        .routes
        .get(key.as_str())
        .cloned()
        .unwrap_or_else(|| Reply::status(404))
        .into_response()
}

/// Serves canned replies keyed by "METHOD target" until the test ends.
async fn serve(routes: Vec<(&'static str, Reply)>) -> (String, Log) {
    let log: Log = Arc::default();
    let app = Router::new().fallback(answer).with_state(Canned {
        routes: Arc::new(routes.into_iter().collect()),
        log: log.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (base, log)
}

#[derive(Default)]
struct Recording {
    progress: Vec<TransferProgress>,
    completed: usize,
    errors: Vec<TransferError>,
}

impl ProgressSink for Recording {
    fn on_progress(&mut self, progress: TransferProgress) {
        self.progress.push(progress);
    }

    fn on_complete(&mut self, _handle: &craft_runtime::BlobHandle) {
        self.completed += 1;
    }

    fn on_error(&mut self, error: &TransferError) {
        self.errors.push(error.clone());
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn fetcher() -> ChunkedFetcher {
    ChunkedFetcher::new(Arc::new(HttpTransport::with_client(client())))
}

fn tusky(base: &str) -> TuskyClient {
    TuskyClient::with_client(client(), &tusky_config(base)).unwrap()
}

fn tusky_config(base: &str) -> TuskyConfig {
    TuskyConfig {
        base_url: base.to_string(),
        api_key: Some("secret-key".into()),
        ..TuskyConfig::default()
    }
}

#[tokio::test]
async fn streams_body_with_progress() {
    let body: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
    let reply = Reply {
        pieces: 3,
        ..Reply::bytes(body.clone())
    };
    let (base, _) = serve(vec![("GET /model.glb", reply)]).await;

    let registry = BlobRegistry::new();
    let mut sink = Recording::default();
    let handle = download(
        &fetcher(),
        &registry,
        &format!("{base}/model.glb"),
        &reqwest::header::HeaderMap::new(),
        &mut sink,
    )
    .await
    .unwrap();

    assert_eq!(handle.len(), 300);
    assert_eq!(registry.resolve(handle.local_url()).unwrap(), Bytes::from(body));
    assert_eq!(sink.completed, 1);
    assert!(sink.errors.is_empty());
    let last = sink.progress.last().unwrap();
    assert_eq!(last.bytes_total, Some(300));
    assert_eq!(last.percent(), Some(100));
    let percents: Vec<u8> = sink.progress.iter().filter_map(|p| p.percent()).collect();
    assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn http_error_status_fails_transfer() {
    let (base, _) = serve(Vec::new()).await;
    let registry = BlobRegistry::new();
    let mut sink = Recording::default();
    let err = download(
        &fetcher(),
        &registry,
        &format!("{base}/missing"),
        &reqwest::header::HeaderMap::new(),
        &mut sink,
    )
    .await
    .unwrap_err();

    assert_eq!(err, TransferError::Http { status: 404 });
    assert_eq!(sink.errors, vec![TransferError::Http { status: 404 }]);
    assert!(sink.progress.is_empty());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn connection_closed_early_fails_transfer() {
    let reply = Reply {
        declared_length: Some(300),
        ..Reply::bytes(vec![7; 100])
    };
    let (base, _) = serve(vec![("GET /short", reply)]).await;
    let registry = BlobRegistry::new();
    let mut sink = Recording::default();
    let result = download(
        &fetcher(),
        &registry,
        &format!("{base}/short"),
        &reqwest::header::HeaderMap::new(),
        &mut sink,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(sink.completed, 0);
    assert_eq!(sink.errors.len(), 1);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let registry = BlobRegistry::new();
    let mut sink = Recording::default();
    let err = download(
        &fetcher(),
        &registry,
        &format!("http://{addr}/model.glb"),
        &reqwest::header::HeaderMap::new(),
        &mut sink,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TransferError::Network(_)));
    assert_eq!(sink.errors, vec![err]);
    assert!(sink.progress.is_empty());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn tusky_lists_vault_files() {
    let (base, log) = serve(vec![
        (
            "GET /vaults",
            Reply::json(r#"[{"id":"v0","name":"other"},{"id":"v1","name":"sui-craft-vault"}]"#),
        ),
        (
            "GET /files?vaultId=v1",
            Reply::json(r#"{"items":[{"id":"f1","name":"tree.glb"},{"id":"f2"}]}"#),
        ),
    ])
    .await;

    let client = tusky(&base);
    let assets = client.list_assets().await.unwrap();

    assert_eq!(assets.len(), 2);
    assert_eq!(assets[0].name, "tree.glb");
    assert_eq!(assets[0].source_url, format!("{base}/files/f1/data"));
    assert_eq!(assets[1].name, "f2");
    let log = log.lock();
    assert_eq!(log.len(), 2);
    assert!(log
        .iter()
        .all(|request| request.headers.get("api-key").map(String::as_str) == Some("secret-key")));
}

#[tokio::test]
async fn tusky_listing_without_vault_is_empty() {
    let (base, log) = serve(vec![("GET /vaults", Reply::json("[]"))]).await;
    let client = tusky(&base);
    assert!(client.list_assets().await.unwrap().is_empty());
    assert!(log.lock().iter().all(|request| request.method == "GET"));
}

#[tokio::test]
async fn tusky_upload_creates_vault() {
    let (base, log) = serve(vec![
        ("GET /vaults", Reply::json("[]")),
        ("POST /vaults", Reply::json(r#"{"id":"v9"}"#)),
        ("POST /vaults/v9/files", Reply::json(r#"{"id":"f42"}"#)),
    ])
    .await;

    let client = tusky(&base);
    let id = client
        .upload("tree.glb", Bytes::from_static(b"glTF-model-bytes"))
        .await
        .unwrap();
    assert_eq!(id, "f42");

    let log = log.lock();
    let targets: Vec<_> = log
        .iter()
        .map(|request| format!("{} {}", request.method, request.target))
        .collect();
    assert_eq!(targets, ["GET /vaults", "POST /vaults", "POST /vaults/v9/files"]);
    let created: serde_json::Value = serde_json::from_slice(&log[1].body).unwrap();
    assert_eq!(created["name"], "sui-craft-vault");
    assert_eq!(created["encrypted"], false);
    let upload = String::from_utf8_lossy(&log[2].body);
    assert!(upload.contains("name=\"file\""));
    assert!(upload.contains("filename=\"tree.glb\""));
    assert!(upload.contains("glTF-model-bytes"));
}

#[tokio::test]
async fn tusky_error_status_is_reported() {
    let (base, _) = serve(vec![("GET /vaults", Reply::status(401))]).await;
    let client = tusky(&base);
    let err = client.list_assets().await.unwrap_err();
    assert!(matches!(err, craft_runtime::ProviderError::Http { status: 401 }));
}

fn pinata(base: &str) -> PinataClient {
    let config = PinataConfig {
        api_url: base.to_string(),
        gateway_url: "https://gateway.example/ipfs/".into(),
        jwt: Some("jwt-token".into()),
    };
    PinataClient::with_clock(client(), &config, SystemClock).unwrap()
}

#[tokio::test]
async fn publish_pins_scene_json() {
    let (base, log) = serve(vec![(
        "POST /pinning/pinFileToIPFS",
        Reply::json(r#"{"IpfsHash":"QmScene","PinSize":120}"#),
    )])
    .await;
    let scene = Scene::new(vec![SceneEntry::Object(SceneObjectRecord::new(
        "tree",
        "https://assets.example/tree.glb",
    ))]);

    let published = pinata(&base).pin_scene(&scene).await.unwrap();
    assert_eq!(published.ipfs_hash, "QmScene");
    assert_eq!(published.url, "https://gateway.example/ipfs/QmScene");

    let log = log.lock();
    assert_eq!(
        log[0].headers.get("authorization").map(String::as_str),
        Some("Bearer jwt-token")
    );
    let body = String::from_utf8_lossy(&log[0].body);
    assert!(body.contains("final_json_"));
    assert!(body.contains(r#""cidVersion":0"#));
    assert!(body.contains("https://assets.example/tree.glb"));
}

#[tokio::test]
async fn publish_without_hash_fails() {
    let (base, _) = serve(vec![(
        "POST /pinning/pinFileToIPFS",
        Reply::json(r#"{"PinSize":120}"#),
    )])
    .await;
    let err = pinata(&base).pin_scene(&Scene::default()).await.unwrap_err();
    assert!(matches!(err, PublishError::MissingHash));
}
