/// mftscout core — whole-volume NTFS indexing and search.
///
/// This crate contains the entire engine with zero UI dependencies: it
/// reads the Master File Table straight off a raw volume device, builds a
/// compact in-memory index of every file, hard link, and data stream, and
/// answers substring/glob/regex queries over full paths at interactive
/// speed.
///
/// # Modules
///
/// - [`model`] — packed value types: 48-bit sizes, bit-packed keys, record
///   components, the shared ascii-directional name buffer.
/// - [`ntfs`] — bit-exact on-disk structure decoding (FRS headers, fixups,
///   attributes, mapping pairs).
/// - [`index`] — the in-memory index: record parser, preprocessing rollup,
///   path rendering, visitor traversal.
/// - [`scanner`] — the async read pipeline: I/O worker pool, run planner,
///   bitmap stage, chunk reader.
/// - [`search`] — pattern matching and sortable results over one or more
///   finalized indexes.
/// - [`platform`] — the raw-volume device trait and its Windows
///   implementation, plus drive enumeration and permission checks.
///
/// # Typical use
///
/// ```no_run
/// use std::sync::Arc;
/// use mftscout_core::{IndexOptions, NtfsIndex};
/// use mftscout_core::scanner::{pool::IoPool, start_index};
/// use mftscout_core::search::{search, PatternSpec, SearchOptions};
///
/// # fn open_device() -> Arc<dyn mftscout_core::platform::VolumeDevice> { unimplemented!() }
/// let pool = IoPool::new(None);
/// let index = NtfsIndex::new("C:\\", IndexOptions::default());
/// let handle = start_index(index.clone(), open_device(), pool);
/// handle.wait();
///
/// let spec = PatternSpec::verbatim("readme").case_insensitive(true);
/// let hits = search(&[index], &spec, &SearchOptions::default()).unwrap();
/// println!("{} matches", hits.len());
/// ```
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod ntfs;
pub mod platform;
pub mod scanner;
pub mod search;

pub use config::IndexOptions;
pub use error::{IndexError, Result};
pub use index::{IndexSnapshot, NtfsIndex};
pub use model::{Key, NameText};
