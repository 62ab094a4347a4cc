/// Indexing options.
///
/// Everything here has a sensible default; hosts typically construct
/// `IndexOptions::default()` and override a field or two. The struct
/// round-trips through JSON so front-ends can persist user overrides.
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Maximum bytes per volume read. 1 MiB amortizes I/O overhead while
    /// keeping enough chunks in flight for concurrency.
    pub read_block_size: u64,

    /// Chunks kept in flight per stage. Two lets one chunk parse while the
    /// next is being read.
    pub io_concurrency: usize,

    /// Bulkiness noise threshold: a child counts toward a directory's
    /// bulkiness only if its allocated size is at least
    /// `directory_allocated / bulkiness_divisor`.
    pub bulkiness_divisor: u64,

    /// Progress messages are emitted roughly once per this many records.
    pub progress_interval: u32,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            read_block_size: 1 << 20,
            io_concurrency: 2,
            bulkiness_divisor: 100,
            progress_interval: 262_144,
        }
    }
}

impl IndexOptions {
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(io::Error::other)
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        let data = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, data)
    }
}
