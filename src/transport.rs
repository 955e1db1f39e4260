use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, CONTENT_LENGTH};

use crate::error::TransferError;

/// Body of a response as a stream of chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// Status line, announced length and body of a GET.
pub struct TransportResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests on behalf of the fetcher.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<TransportResponse, TransferError>;
}

/// HTTP transport backed by reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<TransportResponse, TransferError> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(TransferError::from)?;
        let status = response.status().as_u16();
        // `Response::content_length` reports the body size hint, which is 0 for
        // compressed bodies; read the header itself.
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransferError::from))
            .boxed();
        Ok(TransportResponse {
            status,
            content_length,
            body,
        })
    }
}

/// Canned response served by [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryResponse {
    pub status: u16,
    pub chunks: Vec<Bytes>,
    pub content_length: Option<u64>,
    /// Fail the body with a network error after this many chunks.
    pub fail_after: Option<usize>,
}

impl MemoryResponse {
    /// Successful response announcing the exact length of its chunks.
    pub fn ok<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Bytes> = chunks.into_iter().map(Into::into).collect();
        let length = chunks.iter().map(|chunk| chunk.len() as u64).sum();
        Self {
            status: 200,
            chunks,
            content_length: Some(length),
            fail_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            chunks: Vec::new(),
            content_length: None,
            fail_after: None,
        }
    }

    pub fn without_length(mut self) -> Self {
        self.content_length = None;
        self
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }
}

/// In-process transport for headless callers and tests.
///
/// Responses are looked up by exact URL; unknown URLs answer 404. Request
/// headers are recorded so callers can check what was sent.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    routes: Arc<RwLock<HashMap<String, MemoryResponse>>>,
    requests: Arc<RwLock<Vec<(String, HeaderMap)>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, response: MemoryResponse) {
        self.routes.write().insert(url.into(), response);
    }

    /// URLs and headers of every request served so far, in order.
    pub fn requests(&self) -> Vec<(String, HeaderMap)> {
        self.requests.read().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<TransportResponse, TransferError> {
        self.requests.write().push((url.to_string(), headers.clone()));
        let Some(response) = self.routes.read().get(url).cloned() else {
            return Ok(TransportResponse {
                status: 404,
                content_length: None,
                body: stream::empty().boxed(),
            });
        };

        let fail_after = response.fail_after;
        let mut items: Vec<Result<Bytes, TransferError>> = response
            .chunks
            .into_iter()
            .enumerate()
            .take_while(|(index, _)| fail_after.map(|limit| *index < limit).unwrap_or(true))
            .map(|(_, chunk)| Ok(chunk))
            .collect();
        if fail_after.is_some() {
            items.push(Err(TransferError::Network("connection reset".into())));
        }

        Ok(TransportResponse {
            status: response.status,
            content_length: response.content_length,
            body: stream::iter(items).boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_transport_serves_routes_and_records_headers() {
        let transport = MemoryTransport::new();
        transport.insert("mem://a", MemoryResponse::ok(vec![&b"ab"[..], &b"c"[..]]));

        let mut headers = HeaderMap::new();
        headers.insert("api-key", "secret".parse().unwrap());
        let response = transport.get("mem://a", &headers).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.content_length, Some(3));
        let chunks: Vec<_> = response.body.collect().await;
        assert_eq!(chunks.len(), 2);

        let requests = transport.requests();
        assert_eq!(requests[0].0, "mem://a");
        assert_eq!(requests[0].1["api-key"], "secret");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let transport = MemoryTransport::new();
        let response = transport.get("mem://missing", &HeaderMap::new()).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn failing_body_ends_with_network_error() {
        let transport = MemoryTransport::new();
        transport.insert(
            "mem://flaky",
            MemoryResponse::ok(vec![&b"a"[..], &b"b"[..], &b"c"[..]]).failing_after(1),
        );
        let response = transport.get("mem://flaky", &HeaderMap::new()).await.unwrap();
        let chunks: Vec<_> = response.body.collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(matches!(chunks[1], Err(TransferError::Network(_))));
    }
}
