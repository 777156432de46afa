//! Direct binary upload to a pre-signed destination
//!
//! The file body is streamed in fixed-size chunks so the byte counters can
//! drive a progress callback.

use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;

/// Chunk size for streamed upload bodies (64 KiB)
pub const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Progress callback invoked as chunks are handed to the transfer
pub type ProgressFn = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Byte counters of an in-flight upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub bytes_total: u64,
}

impl UploadProgress {
    /// Whole percent, 100 for empty bodies
    pub fn percent(&self) -> u8 {
        if self.bytes_total == 0 {
            return 100;
        }
        ((self.bytes_sent.min(self.bytes_total) * 100) / self.bytes_total) as u8
    }
}

/// A file body ready for PUT
#[derive(Debug, Clone)]
pub struct UploadBody {
    pub content_type: String,
    pub data: Arc<[u8]>,
}

impl UploadBody {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Progress callback that ignores updates
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Stream `data` in chunks, reporting cumulative bytes after each chunk
pub fn chunked_with_progress(
    data: Arc<[u8]>,
    chunk_size: usize,
    progress: ProgressFn,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + Sync + 'static {
    let total = data.len() as u64;
    let chunk_size = chunk_size.max(1);
    let chunk_count = data.len().div_ceil(chunk_size);

    let chunks = (0..chunk_count).map(move |i| {
        let start = i * chunk_size;
        let end = (start + chunk_size).min(data.len());
        data[start..end].to_vec()
    });

    let mut sent = 0u64;
    stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress(UploadProgress {
            bytes_sent: sent,
            bytes_total: total,
        });
        Ok(chunk)
    })
}
