//! Upload progress reporting for streamed request bodies.

use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;

/// Receives the upload percentage (0..=100).
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync + 'static>;

/// Chunk size handed to the transport between progress reports.
pub const UPLOAD_BLOCK_SIZE: usize = 16 * 1024;

/// Converts byte counts into whole percentages and reports each one at most
/// once, never going backwards even if the stream is polled again after a
/// reset.
#[derive(Clone)]
pub struct UploadProgressReporter {
    total_bytes: u64,
    percent_reported: Arc<AtomicU8>,
    callback: Option<ProgressCallback>,
}

impl UploadProgressReporter {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            percent_reported: Arc::new(AtomicU8::new(0)),
            callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn percent_for(&self, bytes_sent: u64) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let sent = bytes_sent.min(self.total_bytes) as f64;
        ((sent * 100.0) / self.total_bytes as f64).round() as u8
    }

    pub fn report_progress(&self, bytes_sent: u64) {
        let percent = self.percent_for(bytes_sent);
        let previous = self.percent_reported.fetch_max(percent, Ordering::Relaxed);
        if previous >= percent {
            return;
        }
        if let Some(cb) = self.callback.as_ref() {
            cb(percent);
        }
    }
}

/// Yields `data` in blocks of at most `block_size`, reporting how much of it
/// has been handed to the transport.
pub struct UploadProgressStream {
    data: Bytes,
    block_size: usize,
    bytes_sent: usize,
    finished: bool,
    reporter: UploadProgressReporter,
}

impl UploadProgressStream {
    pub fn wrap_bytes_as_stream(
        data: impl Into<Bytes>,
        block_size: usize,
        reporter: UploadProgressReporter,
    ) -> Self {
        Self {
            data: data.into(),
            block_size: block_size.max(1),
            bytes_sent: 0,
            finished: false,
            reporter,
        }
    }
}

impl Stream for UploadProgressStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        // Blocks already yielded have been consumed by the transport by the
        // time it polls again.
        if self.bytes_sent != 0 {
            self.reporter.report_progress(self.bytes_sent as u64);
        }

        if self.bytes_sent == self.data.len() {
            self.finished = true;
            self.reporter.report_progress(self.data.len() as u64);
            return Poll::Ready(None);
        }

        let slice_start = self.bytes_sent;
        let slice_end = (self.bytes_sent + self.block_size).min(self.data.len());
        self.bytes_sent = slice_end;

        Poll::Ready(Some(Ok(self.data.slice(slice_start..slice_end))))
    }
}
