//! Streaming downloads with progress reporting.
//!
//! [`ChunkedFetcher`] opens a response and hands out its body as a
//! [`ChunkStream`]. [`Transfer`] drives one download end to end: it pulls the
//! chunks, feeds a [`BlobAssembler`], reports to a [`ProgressSink`] and
//! finishes with exactly one terminal callback.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use log::{debug, info};
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::blob::{BlobAssembler, BlobHandle, BlobRegistry};
use crate::error::TransferError;
use crate::progress::{ProgressSink, TransferProgress};
use crate::transport::{ByteStream, HttpTransport, Transport};

/// Opens remote objects as chunk streams.
#[derive(Clone)]
pub struct ChunkedFetcher {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for ChunkedFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedFetcher").finish_non_exhaustive()
    }
}

impl Default for ChunkedFetcher {
    fn default() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }
}

impl ChunkedFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Issues the GET and returns the body as a lazy chunk sequence.
    ///
    /// A non-2xx status fails before any chunk is produced.
    pub async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<ChunkStream, TransferError> {
        let response = self.transport.get(url, headers).await?;
        if !response.is_success() {
            return Err(TransferError::Http {
                status: response.status,
            });
        }
        Ok(ChunkStream::new(response.body, response.content_length))
    }
}

/// Finite, non-restartable sequence of body chunks.
///
/// Dropping the stream releases the underlying connection.
pub struct ChunkStream {
    body: ByteStream,
    progress: TransferProgress,
    finished: bool,
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream")
            .field("progress", &self.progress)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ChunkStream {
    fn new(body: ByteStream, content_length: Option<u64>) -> Self {
        Self {
            body,
            progress: TransferProgress::new(content_length),
            finished: false,
        }
    }

    pub fn progress(&self) -> TransferProgress {
        self.progress
    }

    /// Next chunk, `None` at end-of-stream. After an error or the end, the
    /// stream stays exhausted.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, TransferError>> {
        if self.finished {
            return None;
        }
        match self.body.next().await {
            Some(Ok(chunk)) => {
                self.progress.record(chunk.len());
                if let Some(expected) = self.progress.bytes_total {
                    if self.progress.bytes_received > expected {
                        self.finished = true;
                        return Some(Err(TransferError::Overrun {
                            expected,
                            received: self.progress.bytes_received,
                        }));
                    }
                }
                Some(Ok(chunk))
            }
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            None => {
                self.finished = true;
                match self.progress.bytes_total {
                    Some(expected) if self.progress.bytes_received < expected => {
                        Some(Err(TransferError::Truncated {
                            expected,
                            received: self.progress.bytes_received,
                        }))
                    }
                    _ => None,
                }
            }
        }
    }
}

/// Lifecycle of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Requesting,
    Streaming,
    Assembling,
    Completed,
    Failed,
}

impl TransferState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Streaming => "streaming",
            Self::Assembling => "assembling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One download from request to registered blob.
#[derive(Debug)]
pub struct Transfer {
    fetcher: ChunkedFetcher,
    registry: BlobRegistry,
    cancel: CancellationToken,
    state: TransferState,
}

impl Transfer {
    pub fn new(fetcher: ChunkedFetcher, registry: BlobRegistry) -> Self {
        Self {
            fetcher,
            registry,
            cancel: CancellationToken::new(),
            state: TransferState::Idle,
        }
    }

    /// Uses the given token for abandonment instead of a private one.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Token that abandons the transfer when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns a terminal transfer to `Idle` so the caller can try again.
    ///
    /// A cancelled token is replaced with a fresh one; callers sharing the
    /// old token must fetch the new one with [`Transfer::cancellation_token`].
    pub fn reset(&mut self) {
        if self.state.is_terminal() {
            self.state = TransferState::Idle;
            if self.cancel.is_cancelled() {
                self.cancel = CancellationToken::new();
            }
        }
    }

    /// Downloads `url` into a blob handle.
    ///
    /// `sink` sees progress after every chunk and exactly one terminal
    /// callback. Once cancelled, no further progress is reported and the
    /// terminal callback is `on_error` with [`TransferError::Cancelled`].
    /// Failed transfers register no blob.
    pub async fn run(
        &mut self,
        url: &str,
        headers: &HeaderMap,
        sink: &mut dyn ProgressSink,
    ) -> Result<BlobHandle, TransferError> {
        if self.state != TransferState::Idle {
            return Err(TransferError::InvalidState(self.state.as_str()));
        }

        match self.drive(url, headers, sink).await {
            Ok(handle) => {
                self.state = TransferState::Completed;
                info!("downloaded {url} ({} bytes)", handle.len());
                sink.on_complete(&handle);
                Ok(handle)
            }
            Err(TransferError::Cancelled) => {
                self.state = TransferState::Failed;
                debug!("transfer of {url} abandoned");
                sink.on_error(&TransferError::Cancelled);
                Err(TransferError::Cancelled)
            }
            Err(err) => {
                self.state = TransferState::Failed;
                sink.on_error(&err);
                Err(err)
            }
        }
    }

    async fn drive(
        &mut self,
        url: &str,
        headers: &HeaderMap,
        sink: &mut dyn ProgressSink,
    ) -> Result<BlobHandle, TransferError> {
        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        self.state = TransferState::Requesting;
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            opened = self.fetcher.fetch(url, headers) => opened?,
        };

        self.state = TransferState::Streaming;
        let mut assembler = BlobAssembler::new();
        assembler.begin();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                next = stream.next_chunk() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    assembler.push(&chunk);
                    let progress = stream.progress();
                    debug!(
                        "{url}: {} bytes received ({:?} total)",
                        progress.bytes_received, progress.bytes_total
                    );
                    sink.on_progress(progress);
                }
                Some(Err(err)) => return Err(err),
                None => break,
            }
        }
        drop(stream);

        self.state = TransferState::Assembling;
        assembler.end();
        Ok(assembler.finalize(&self.registry)?)
    }
}

/// Convenience for a one-shot transfer with a private cancellation token.
pub async fn download(
    fetcher: &ChunkedFetcher,
    registry: &BlobRegistry,
    url: &str,
    headers: &HeaderMap,
    sink: &mut dyn ProgressSink,
) -> Result<BlobHandle, TransferError> {
    Transfer::new(fetcher.clone(), registry.clone())
        .run(url, headers, sink)
        .await
}
