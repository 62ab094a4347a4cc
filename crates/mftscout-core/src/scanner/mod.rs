/// Scanner orchestration: wires a volume device, an I/O pool, and an index
/// together and runs the scan on a background thread.
pub mod bitmap;
pub mod chunks;
pub mod pool;
pub mod progress;
pub(crate) mod reader;

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::Receiver;
use tracing::info;

use crate::error::{finish, IndexError};
use crate::index::NtfsIndex;
use crate::platform::volume::VolumeDevice;

use pool::IoPool;
use progress::ScanProgress;
use reader::MftReadJob;

/// Maximum progress messages queued before older updates are dropped.
///
/// Updates are sent with `try_send`, so a slow host loses intermediate
/// updates rather than stalling the I/O workers.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// Handle to a running or completed volume scan.
pub struct IndexHandle {
    /// The shared index; queryable (partially) even while populating.
    pub index: Arc<NtfsIndex>,
    /// Receiver for progress updates from the scan.
    pub progress_rx: Receiver<ScanProgress>,
    thread: Option<thread::JoinHandle<()>>,
}

impl IndexHandle {
    /// Request the scan to stop as soon as possible.
    pub fn cancel(&self) {
        self.index.cancel();
    }

    /// Block until the scan finishes (or dies), returning the finish code.
    pub fn wait(mut self) -> u32 {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.index.finished_event().wait();
        self.index.finish_code()
    }
}

impl Drop for IndexHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Start indexing `device` into `index` using `pool` for I/O.
///
/// The pool is shared state owned by the host (one per process is typical);
/// several volumes can scan on it concurrently, with per-device priorities
/// deciding whose reads drain first.
pub fn start_index(
    index: Arc<NtfsIndex>,
    device: Arc<dyn VolumeDevice>,
    pool: Arc<IoPool>,
) -> IndexHandle {
    let (progress_tx, progress_rx) =
        crossbeam_channel::bounded::<ScanProgress>(PROGRESS_CHANNEL_CAPACITY);

    let thread_index = index.clone();
    let thread = thread::Builder::new()
        .name("mftscout-scan".into())
        .spawn(move || {
            info!(volume = %thread_index.root_path(), "starting MFT scan");
            let started = Instant::now();
            thread_index.init(device.clone());

            // Launch plans the chunk lists and primes the pipeline; all
            // further work happens on the pool's completion workers.
            let job = MftReadJob::launch(pool, thread_index.clone(), device, progress_tx.clone());
            match job {
                Ok(_job) => {
                    thread_index.finished_event().wait();
                    let code = thread_index.finish_code();
                    let message = if code == finish::CANCELLED {
                        ScanProgress::Cancelled
                    } else {
                        ScanProgress::Complete {
                            duration: started.elapsed(),
                            code,
                        }
                    };
                    let _ = progress_tx.send(message);
                    info!(
                        volume = %thread_index.root_path(),
                        code,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "MFT scan finished"
                    );
                }
                Err(err) => {
                    let code = match &err {
                        IndexError::Io(io_err) => crate::error::finish_code_for(io_err),
                        IndexError::Cancelled => finish::CANCELLED,
                        _ => finish::UNRECOGNIZED_VOLUME,
                    };
                    tracing::error!(volume = %thread_index.root_path(), %err, "scan failed to start");
                    thread_index.set_finished(code);
                    let _ = progress_tx.send(ScanProgress::Error {
                        code,
                        message: err.to_string(),
                    });
                }
            }
        })
        .expect("failed to spawn scan thread");

    IndexHandle {
        index,
        progress_rx,
        thread: Some(thread),
    }
}
