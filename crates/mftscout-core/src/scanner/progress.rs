/// Scan progress reporting — lightweight messages sent from the I/O
/// workers to the host via a crossbeam channel, plus the rolling read-speed
/// average used for ETAs.
use std::time::Duration;

/// Progress updates sent to the host while a volume is being indexed.
///
/// The index itself is reached through the shared `NtfsIndex`; these
/// messages carry only counters and status flags.
#[derive(Debug)]
pub enum ScanProgress {
    /// Geometry is known and chunk issuance is starting.
    Started {
        expected_records: u32,
        cluster_size: u32,
        frs_size: u32,
    },
    /// Periodic update with running totals.
    Update {
        records_so_far: u32,
        expected_records: u32,
    },
    /// A chunk failed to read; the scan continues without it.
    Error { code: u32, message: String },
    /// Population and preprocessing finished. `code` is the scan finish
    /// code (`finish::OK` unless a chunk was lost).
    Complete { duration: Duration, code: u32 },
    /// Scan was cancelled; the partial index remains queryable.
    Cancelled,
}

/// A byte count over a wall-clock interval.
#[derive(Clone, Copy, Default, Debug)]
pub struct Speed {
    pub bytes: u64,
    pub millis: u64,
}

impl Speed {
    pub fn bytes_per_sec(&self) -> u64 {
        if self.millis == 0 {
            0
        } else {
            self.bytes * 1000 / self.millis
        }
    }
}

const SPEED_WINDOW: usize = 64;

/// Circular window over recent chunk reads. `average()` sums the window,
/// smoothing per-chunk jitter without letting ancient history dominate.
pub struct SpeedTracker {
    window: [Speed; SPEED_WINDOW],
    next: usize,
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self {
            window: [Speed::default(); SPEED_WINDOW],
            next: 0,
        }
    }
}

impl SpeedTracker {
    pub fn report(&mut self, bytes: u64, elapsed: Duration) {
        self.window[self.next] = Speed {
            bytes,
            millis: elapsed.as_millis() as u64,
        };
        self.next = (self.next + 1) % SPEED_WINDOW;
    }

    pub fn average(&self) -> Speed {
        let mut total = Speed::default();
        for s in &self.window {
            total.bytes += s.bytes;
            total.millis += s.millis;
        }
        total
    }
}
