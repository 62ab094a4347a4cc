/// The in-memory volume index.
///
/// One `NtfsIndex` holds everything known about one NTFS volume: the record
/// arena behind a reader/writer lock, the scan counters, and the finished
/// event. Population runs single-writer (parse completions serialize on the
/// write lock); once the finished event fires the index is immutable and
/// any number of readers can hold snapshots concurrently.
pub(crate) mod parse;
pub mod path;
pub(crate) mod preprocess;
pub mod store;
pub mod visit;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};

use crate::config::IndexOptions;
use crate::error::{finish, IndexError, Result};
use crate::platform::volume::{VolumeDevice, VolumeGeometry};
use crate::scanner::progress::{Speed, SpeedTracker};

use parse::{preload_chunk, ParseContext};
use preprocess::Preprocessor;
use store::IndexStore;

pub use path::FilePointers;
pub use visit::MatchOptions;

/// A manual-reset event: set once, observed by any number of waiters.
#[derive(Default)]
pub struct ManualResetEvent {
    state: Mutex<bool>,
    cond: Condvar,
}

impl ManualResetEvent {
    pub fn set(&self) {
        let mut state = self.state.lock();
        *state = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.state.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock()
    }

    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !*state {
            self.cond.wait(&mut state);
        }
    }

    /// Wait with a deadline; true if the event was set in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !*state {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return *state;
            }
        }
        true
    }
}

pub struct NtfsIndex {
    root_path: String,
    options: IndexOptions,

    store: RwLock<IndexStore>,
    /// Held open for the duration of the scan; dropped (closing the raw
    /// handle) when preprocessing completes or the scan dies.
    device: Mutex<Option<Arc<dyn VolumeDevice>>>,

    // Volume geometry, written once by the reader before any chunk parses.
    cluster_size: AtomicU32,
    frs_size: AtomicU32,
    mft_capacity: AtomicU32,
    mft_zone_start: AtomicI64,
    mft_zone_end: AtomicI64,
    pub(crate) reserved_clusters: AtomicI64,

    records_so_far: AtomicU32,
    preprocessed_so_far: AtomicU32,
    total_names_and_streams: AtomicU64,
    expected_records: AtomicU32,

    cancelled: AtomicBool,
    /// First error code recorded by any chunk; becomes the finish code.
    fail_code: AtomicU32,
    finished: AtomicU32,
    finished_event: ManualResetEvent,

    speed: Mutex<SpeedTracker>,
    init_called: AtomicBool,
}

impl NtfsIndex {
    pub fn new(root_path: impl Into<String>, options: IndexOptions) -> Arc<Self> {
        Arc::new(Self {
            root_path: root_path.into(),
            options,
            store: RwLock::new(IndexStore::default()),
            device: Mutex::new(None),
            cluster_size: AtomicU32::new(0),
            frs_size: AtomicU32::new(0),
            mft_capacity: AtomicU32::new(0),
            mft_zone_start: AtomicI64::new(0),
            mft_zone_end: AtomicI64::new(0),
            reserved_clusters: AtomicI64::new(0),
            records_so_far: AtomicU32::new(0),
            preprocessed_so_far: AtomicU32::new(0),
            total_names_and_streams: AtomicU64::new(0),
            expected_records: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            fail_code: AtomicU32::new(finish::OK),
            finished: AtomicU32::new(finish::OK),
            finished_event: ManualResetEvent::default(),
            speed: Mutex::new(SpeedTracker::default()),
            init_called: AtomicBool::new(false),
        })
    }

    /// Attach the opened volume device. Called once by the scan before any
    /// I/O is issued.
    pub fn init(&self, device: Arc<dyn VolumeDevice>) {
        *self.device.lock() = Some(device);
        self.init_called.store(true, Ordering::Release);
    }

    pub fn init_called(&self) -> bool {
        self.init_called.load(Ordering::Acquire)
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub(crate) fn set_geometry(&self, g: &VolumeGeometry) {
        self.cluster_size.store(g.bytes_per_cluster, Ordering::Release);
        self.frs_size.store(g.bytes_per_frs, Ordering::Release);
        self.mft_capacity.store(g.mft_capacity(), Ordering::Release);
        self.mft_zone_start.store(g.mft_zone_start, Ordering::Release);
        // Collapse the zone so it is not double-counted as used space; the
        // whole reservation is carried in `reserved_clusters` instead.
        self.mft_zone_end.store(g.mft_zone_start, Ordering::Release);
        self.reserved_clusters
            .store(g.total_reserved_clusters, Ordering::Release);
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size.load(Ordering::Acquire)
    }

    pub fn frs_size(&self) -> u32 {
        self.frs_size.load(Ordering::Acquire)
    }

    pub fn mft_capacity(&self) -> u32 {
        self.mft_capacity.load(Ordering::Acquire)
    }

    pub fn expected_records(&self) -> u32 {
        self.expected_records.load(Ordering::Acquire)
    }

    pub fn records_so_far(&self) -> u32 {
        self.records_so_far.load(Ordering::Acquire)
    }

    pub fn preprocessed_so_far(&self) -> u32 {
        self.preprocessed_so_far.load(Ordering::Acquire)
    }

    pub fn total_names_and_streams(&self) -> u64 {
        self.total_names_and_streams.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Record a chunk-level failure; the first code wins and becomes the
    /// scan's finish code.
    pub(crate) fn record_failure(&self, code: u32) {
        let _ = self
            .fail_code
            .compare_exchange(finish::OK, code, Ordering::AcqRel, Ordering::Acquire);
    }

    pub(crate) fn fail_code(&self) -> u32 {
        self.fail_code.load(Ordering::Acquire)
    }

    pub(crate) fn set_finished(&self, code: u32) {
        self.finished.store(code, Ordering::Release);
        *self.device.lock() = None;
        self.finished_event.set();
    }

    /// The scan's finish code; meaningful once `finished_event` is set.
    pub fn finish_code(&self) -> u32 {
        self.finished.load(Ordering::Acquire)
    }

    /// Signalled iff population (and preprocessing) is complete.
    pub fn finished_event(&self) -> &ManualResetEvent {
        &self.finished_event
    }

    pub fn is_finished(&self) -> bool {
        self.finished_event.is_set()
    }

    /// Rolling average of recent volume reads.
    pub fn speed(&self) -> Speed {
        self.speed.lock().average()
    }

    pub(crate) fn report_speed(&self, bytes: u64, elapsed: Duration) {
        self.speed.lock().report(bytes, elapsed);
    }

    /// Pre-size the arenas once the bitmap population count is known.
    pub(crate) fn reserve(&self, valid_records: u32) {
        self.expected_records.store(
            self.mft_capacity.load(Ordering::Acquire),
            Ordering::Release,
        );
        tracing::debug!(
            volume = %self.root_path,
            valid_records,
            "reserving index arenas"
        );
        self.store.write().reserve(valid_records);
    }

    /// Lock-free pre-pass over a data chunk: applies fixups and pre-sizes
    /// the records table for the highest FRS the chunk merges into.
    pub(crate) fn preload(&self, virtual_offset: u64, buf: &mut [u8]) {
        let frs_size = self.frs_size();
        if frs_size == 0 || !frs_size.is_power_of_two() {
            return;
        }
        if let Some(max_frs_plus_one) = preload_chunk(virtual_offset, buf, frs_size) {
            // One reallocation per chunk at most.
            self.store.write().ensure_record(max_frs_plus_one - 1);
        }
    }

    /// Parse a fixed-up data chunk under the write lock. Returns true when
    /// this chunk completed the scan (preprocessing has then already run
    /// and the finished event is set).
    pub(crate) fn load(
        &self,
        virtual_offset: u64,
        buf: &[u8],
        skipped_begin: u64,
        skipped_end: u64,
        bitmap: Option<&[u8]>,
    ) -> Result<bool> {
        if self.cancelled() {
            return Err(IndexError::Cancelled);
        }
        let frs_size = self.frs_size();
        if frs_size == 0 || buf.len() % frs_size as usize != 0 {
            return Err(IndexError::UnsupportedVolume(
                "cluster size is smaller than the FRS size; split MFT records are not supported"
                    .into(),
            ));
        }
        let frs_size_log2 = frs_size.trailing_zeros();

        if skipped_begin != 0 || skipped_end != 0 {
            self.records_so_far.fetch_add(
                ((skipped_begin + skipped_end) >> frs_size_log2) as u32,
                Ordering::AcqRel,
            );
        }

        let ctx = ParseContext {
            frs_size,
            mft_zone_start: self.mft_zone_start.load(Ordering::Acquire),
            mft_zone_end: self.mft_zone_end.load(Ordering::Acquire),
            bitmap,
        };

        let mut store = self.store.write();
        let outcome = store.parse_chunk(virtual_offset, buf, &ctx);

        if outcome.reserved_clusters_delta != 0 {
            self.reserved_clusters
                .fetch_add(outcome.reserved_clusters_delta, Ordering::AcqRel);
        }
        if outcome.names_and_streams_delta != 0 {
            self.total_names_and_streams
                .fetch_add(outcome.names_and_streams_delta, Ordering::AcqRel);
        }
        let records_so_far = self
            .records_so_far
            .fetch_add(outcome.records_seen, Ordering::AcqRel)
            + outcome.records_seen;

        let finished = records_so_far >= self.mft_capacity();
        if finished {
            self.finish_population(&mut store);
        }
        Ok(finished)
    }

    /// End-of-scan: roll up the tree, release the volume handle, and signal
    /// the finished event. Caller holds the write lock, which also makes
    /// the is-set check race-free: a later chunk that overshoots the record
    /// count must not preprocess a second time.
    fn finish_population(&self, store: &mut IndexStore) {
        if self.finished_event.is_set() {
            return;
        }
        let t0 = Instant::now();
        let streams_done = Preprocessor::new(
            store,
            self.cluster_size(),
            self.reserved_clusters.load(Ordering::Acquire),
            self.options.bulkiness_divisor,
        )
        .run();
        self.preprocessed_so_far
            .fetch_add(streams_done, Ordering::AcqRel);

        tracing::info!(
            volume = %self.root_path,
            records = store.record_count(),
            names = store.name_count(),
            streams = streams_done,
            preprocess_ms = t0.elapsed().as_millis() as u64,
            "index population complete"
        );

        self.set_finished(self.fail_code());
    }

    /// Force completion: preprocess whatever was parsed and signal the
    /// finished event. Used when the chunk lists were exhausted without the
    /// record counter reaching the declared MFT capacity.
    pub(crate) fn finish_now(&self) {
        if self.finished_event.is_set() {
            return;
        }
        let mut store = self.store.write();
        if !self.finished_event.is_set() {
            self.finish_population(&mut store);
        }
    }

    /// A read-only view of the populated index. Parser completions block
    /// while any snapshot is held; take snapshots briefly during a scan.
    pub fn read(&self) -> IndexSnapshot<'_> {
        IndexSnapshot {
            index: self,
            store: self.store.read(),
        }
    }
}

impl std::fmt::Debug for NtfsIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtfsIndex")
            .field("root_path", &self.root_path)
            .field("records_so_far", &self.records_so_far())
            .field("expected_records", &self.expected_records())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Read guard over a volume index; all query operations live here.
pub struct IndexSnapshot<'a> {
    pub(crate) index: &'a NtfsIndex,
    pub(crate) store: RwLockReadGuard<'a, IndexStore>,
}

impl IndexSnapshot<'_> {
    pub fn root_path(&self) -> &str {
        self.index.root_path()
    }

    pub fn record_count(&self) -> usize {
        self.store.record_count()
    }

    /// Whether an FRS number maps to an indexed record.
    pub fn contains_record(&self, frs: u32) -> bool {
        self.store.record_index(frs).is_some()
    }

    /// Decode the link name behind resolved file pointers.
    pub fn link_name(&self, pointers: &path::FilePointers<'_>) -> String {
        self.store.text(&pointers.link.name).to_string_lossy()
    }

    /// Integrity check over the whole store: per-record list lengths match
    /// the stored counts, lists are cycle-free, and the FRS lookup table is
    /// bijective over allocated slots.
    pub fn validate(&self) -> crate::error::Result<()> {
        let store = self.store();
        let mut seen = vec![false; store.record_count()];
        for frs in 0..store.lookup_len() {
            let Some(idx) = store.record_index(frs as u32) else {
                continue;
            };
            if std::mem::replace(&mut seen[idx as usize], true) {
                return Err(IndexError::InvalidKey);
            }
            let record = store.record(idx);
            let names = store.links_of(idx).take(u16::MAX as usize).count();
            if names > record.name_count as usize {
                return Err(IndexError::InvalidKey);
            }
            let mut streams = 0usize;
            let mut cursor = store.first_stream_ref(idx);
            while let Some(r) = cursor {
                streams += 1;
                if streams > u16::MAX as usize {
                    return Err(IndexError::InvalidKey);
                }
                cursor = store.next_stream_ref(r);
            }
            if streams != record.stream_count as usize {
                return Err(IndexError::InvalidKey);
            }
        }
        Ok(())
    }

    pub(crate) fn store(&self) -> &IndexStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_reset_event_wakes_waiters() {
        let event = Arc::new(ManualResetEvent::default());
        assert!(!event.is_set());
        assert!(!event.wait_timeout(Duration::from_millis(10)));

        let clone = event.clone();
        let waiter = std::thread::spawn(move || {
            clone.wait();
            true
        });
        std::thread::sleep(Duration::from_millis(20));
        event.set();
        assert!(waiter.join().unwrap());
        assert!(event.is_set());
        assert!(event.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn first_failure_code_wins() {
        let index = NtfsIndex::new("T:\\", IndexOptions::default());
        index.record_failure(5);
        index.record_failure(6);
        assert_eq!(index.fail_code(), 5);
    }

    #[test]
    fn cancel_flag_round_trips() {
        let index = NtfsIndex::new("T:\\", IndexOptions::default());
        assert!(!index.cancelled());
        index.cancel();
        assert!(index.cancelled());
    }
}
