/// The I/O worker pool: the completion-pipeline heart of the scanner.
///
/// Reads are not performed where they are requested. `submit` enqueues a
/// pending entry and posts a wake packet; a worker claims the
/// highest-priority pending read, performs it, and runs the completion
/// handler inline. With several volumes scanning at once this drains the
/// foreground volume's queue ahead of background ones.
///
/// The pool is constructed by the host and injected into every scan — it is
/// deliberately not a process-wide singleton.
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::platform::volume::VolumeDevice;

/// A read's completion handler. `complete` is called exactly once, on a
/// worker thread, with the filled buffer or the error.
pub trait ReadCompletion: Send {
    /// Polled at dispatch; cancelled reads complete immediately with
    /// `ErrorKind::Interrupted` instead of touching the device.
    fn cancelled(&self) -> bool {
        false
    }

    fn complete(self: Box<Self>, result: io::Result<Vec<u8>>);
}

struct PendingRead {
    device: Arc<dyn VolumeDevice>,
    offset: u64,
    length: usize,
    op: Box<dyn ReadCompletion>,
}

enum Packet {
    Wake,
    Terminate,
}

struct PoolShared {
    tx: Sender<Packet>,
    rx: Receiver<Packet>,
    pending: Mutex<PendingQueue>,
}

#[derive(Default)]
struct PendingQueue {
    tasks: Vec<PendingRead>,
    /// Rotates the scan start so equal-priority volumes share bandwidth.
    scan_offset: usize,
}

impl PendingQueue {
    /// Pop the pending read with the highest device priority, scanning
    /// backwards from the rotation point.
    fn pop_highest_priority(&mut self) -> Option<PendingRead> {
        if self.tasks.is_empty() {
            return None;
        }
        let n = self.tasks.len();
        let mut best: Option<(usize, u8)> = None;
        for _ in 0..n {
            if self.scan_offset == 0 || self.scan_offset > n {
                self.scan_offset = n;
            }
            self.scan_offset -= 1;
            let i = self.scan_offset;
            let priority = self.tasks[i].device.io_priority();
            match best {
                Some((_, p)) if p >= priority => {}
                _ => best = Some((i, priority)),
            }
        }
        let (index, _) = best?;
        self.scan_offset = index;
        Some(self.tasks.remove(index))
    }
}

pub struct IoPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl IoPool {
    /// Spin up `workers` threads (defaults to the logical CPU count).
    pub fn new(workers: Option<usize>) -> Arc<Self> {
        let n = workers.unwrap_or_else(num_cpus::get).max(1);
        let (tx, rx) = unbounded();
        let shared = Arc::new(PoolShared {
            tx,
            rx,
            pending: Mutex::new(PendingQueue::default()),
        });

        let mut handles = Vec::with_capacity(n);
        for i in 0..n {
            let shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("mftscout-io-{i}"))
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn I/O worker");
            handles.push(handle);
        }
        tracing::debug!(workers = n, "I/O pool started");

        Arc::new(Self {
            shared,
            workers: Mutex::new(handles),
        })
    }

    /// Queue an asynchronous read of `length` bytes at `offset`.
    ///
    /// The completion is delivered exactly once, on an arbitrary worker, in
    /// arbitrary order relative to other reads.
    pub fn submit(
        &self,
        device: Arc<dyn VolumeDevice>,
        offset: u64,
        length: usize,
        op: Box<dyn ReadCompletion>,
    ) {
        self.shared.pending.lock().tasks.push(PendingRead {
            device,
            offset,
            length,
            op,
        });
        let _ = self.shared.tx.send(Packet::Wake);
    }

    /// Stop accepting work and wait for every worker to drain and exit.
    /// Unclaimed pending reads complete with `Interrupted`.
    pub fn shutdown(&self) {
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for _ in &workers {
            let _ = self.shared.tx.send(Packet::Terminate);
        }
        for handle in workers {
            let _ = handle.join();
        }
        // Anything still pending was never claimed; fail it out.
        let leftovers: Vec<PendingRead> = std::mem::take(&mut self.shared.pending.lock().tasks);
        for task in leftovers {
            task.op.complete(Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "I/O pool shut down",
            )));
        }
        tracing::debug!("I/O pool stopped");
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &PoolShared) {
    while let Ok(packet) = shared.rx.recv() {
        match packet {
            Packet::Terminate => break,
            Packet::Wake => {
                let Some(task) = shared.pending.lock().pop_highest_priority() else {
                    continue;
                };
                // A panicking completion must not take the worker down;
                // treat it as a cancellation of that one read.
                if catch_unwind(AssertUnwindSafe(|| run_task(task))).is_err() {
                    tracing::error!("read completion panicked; treated as cancelled");
                }
            }
        }
    }
}

fn run_task(task: PendingRead) {
    if task.op.cancelled() {
        task.op.complete(Err(io::Error::new(
            io::ErrorKind::Interrupted,
            "read cancelled",
        )));
        return;
    }
    let mut buffer = vec![0u8; task.length];
    match task.device.read_at(task.offset, &mut buffer) {
        Ok(()) => task.op.complete(Ok(buffer)),
        Err(err) => task.op.complete(Err(err)),
    }
}
