use log::{debug, info, warn};

use crate::blob::BlobHandle;
use crate::error::TransferError;

/// Byte counters for one in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferProgress {
    pub bytes_received: u64,
    /// `None` when the remote did not announce a length.
    pub bytes_total: Option<u64>,
}

impl TransferProgress {
    /// Starts a new counter. A zero total is treated as unknown.
    pub fn new(bytes_total: Option<u64>) -> Self {
        Self {
            bytes_received: 0,
            bytes_total: bytes_total.filter(|total| *total > 0),
        }
    }

    /// Whole percentage received, rounded down.
    pub fn percent(&self) -> Option<u8> {
        let total = self.bytes_total?;
        let percent = self.bytes_received.saturating_mul(100) / total;
        Some(percent.min(100) as u8)
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_total
            .map(|total| self.bytes_received >= total)
            .unwrap_or(false)
    }

    pub(crate) fn record(&mut self, len: usize) {
        self.bytes_received += len as u64;
    }
}

/// Observer for the lifecycle of a transfer.
///
/// `on_progress` may fire any number of times, followed by exactly one of
/// `on_complete` or `on_error`. Every method defaults to a no-op.
pub trait ProgressSink: Send {
    fn on_progress(&mut self, _progress: TransferProgress) {}

    fn on_complete(&mut self, _handle: &BlobHandle) {}

    fn on_error(&mut self, _error: &TransferError) {}
}

/// Sink for callers that render no progress at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {}

/// Sink that reports through the `log` facade.
///
/// Percentages are logged only when they change so that small chunks do not
/// flood the output; unknown-length transfers log received bytes at debug level.
#[derive(Debug, Clone)]
pub struct LogSink {
    label: String,
    last_percent: Option<u8>,
}

impl LogSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_percent: None,
        }
    }
}

impl ProgressSink for LogSink {
    fn on_progress(&mut self, progress: TransferProgress) {
        match progress.percent() {
            Some(percent) if self.last_percent != Some(percent) => {
                self.last_percent = Some(percent);
                info!("{}: {percent}%", self.label);
            }
            Some(_) => {}
            None => debug!("{}: {} bytes", self.label, progress.bytes_received),
        }
    }

    fn on_complete(&mut self, handle: &BlobHandle) {
        info!(
            "{}: complete ({} bytes at {})",
            self.label,
            handle.len(),
            handle.local_url()
        );
    }

    fn on_error(&mut self, error: &TransferError) {
        warn!("{}: failed: {error}", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_floored() {
        let mut progress = TransferProgress::new(Some(300));
        progress.record(100);
        assert_eq!(progress.percent(), Some(33));
        progress.record(100);
        assert_eq!(progress.percent(), Some(66));
        progress.record(100);
        assert_eq!(progress.percent(), Some(100));
        assert!(progress.is_complete());
    }

    #[test]
    fn zero_total_means_unknown() {
        let mut progress = TransferProgress::new(Some(0));
        progress.record(42);
        assert_eq!(progress.bytes_total, None);
        assert_eq!(progress.percent(), None);
        assert!(!progress.is_complete());
    }

    #[test]
    fn noop_sink_accepts_every_callback() {
        let mut sink = NoopSink;
        sink.on_progress(TransferProgress::new(None));
        sink.on_error(&TransferError::Cancelled);
    }
}
