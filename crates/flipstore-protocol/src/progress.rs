//! Chunked transfer progress.

/// Direction of a chunked transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    Upload,
    /// Device to host.
    Download,
}

/// Progress of a chunked transfer.
///
/// `transferred` only ever grows, and only counts chunks the other side
/// has fully accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Transfer direction.
    pub direction: Direction,
    /// Total bytes in the transfer.
    pub total_bytes: u64,
    /// Bytes completed so far.
    pub transferred: u64,
    /// Bytes per chunk.
    pub chunk_size: usize,
}

impl TransferProgress {
    /// Create progress for a transfer that has not started.
    pub fn new(direction: Direction, total_bytes: u64, chunk_size: usize) -> Self {
        TransferProgress {
            direction,
            total_bytes,
            transferred: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Record a completed chunk of `bytes` bytes.
    pub fn advance(&mut self, bytes: usize) {
        self.transferred += bytes as u64;
    }

    /// Total number of chunks, `ceil(total / chunk_size)`.
    pub fn total_chunks(&self) -> u64 {
        self.total_bytes.div_ceil(self.chunk_size as u64)
    }

    /// Number of chunks completed so far (the last partial chunk counts once done).
    pub fn current_chunk(&self) -> u64 {
        self.transferred.div_ceil(self.chunk_size as u64)
    }

    /// Completion percentage (100 for an empty transfer).
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        ((self.transferred.min(self.total_bytes) * 100) / self.total_bytes) as u8
    }

    /// Whether every byte has been transferred.
    pub fn is_complete(&self) -> bool {
        self.transferred >= self.total_bytes
    }
}
