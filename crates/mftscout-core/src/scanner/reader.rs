/// The MFT read job: plans chunk lists for `$MFT::$BITMAP` and
/// `$MFT::$DATA`, keeps W chunks in flight per stage, and handles
/// completions.
///
/// Bitmap chunks are issued first. When the last bitmap completion lands,
/// the population count sizes the index and every data chunk gets its skip
/// ranges; data issuance picks them up through the chunk's acquire loads.
/// Each completion issues the next chunk before parsing so the disk never
/// idles behind the parser.
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::{finish, finish_code_for, IndexError};
use crate::index::NtfsIndex;
use crate::platform::volume::{MftStream, VolumeDevice};

use super::bitmap::{compute_skip_clusters, count_bits};
use super::chunks::{plan_chunks, Chunk};
use super::pool::{IoPool, ReadCompletion};
use super::progress::ScanProgress;

pub(crate) struct MftReadJob {
    pool: Arc<IoPool>,
    index: Arc<NtfsIndex>,
    device: Arc<dyn VolumeDevice>,
    progress: Sender<ScanProgress>,

    cluster_size: u32,
    bitmap_chunks: Vec<Chunk>,
    data_chunks: Vec<Chunk>,

    next_bitmap: AtomicUsize,
    next_data: AtomicUsize,
    bitmap_chunks_left: AtomicUsize,
    inflight: AtomicUsize,
    valid_records: AtomicU32,
    /// One bit per FRS slot; regions are written by exactly one completion
    /// each, but a lock keeps the copies trivially safe.
    mft_bitmap: Mutex<Vec<u8>>,
    last_progress_at: AtomicU32,
}

impl MftReadJob {
    /// Query geometry, plan both chunk lists, and issue the first W reads.
    ///
    /// Fails synchronously for unsupported layouts; the caller converts the
    /// error into the index's finish code.
    pub(crate) fn launch(
        pool: Arc<IoPool>,
        index: Arc<NtfsIndex>,
        device: Arc<dyn VolumeDevice>,
        progress: Sender<ScanProgress>,
    ) -> Result<Arc<Self>, IndexError> {
        let geometry = device.geometry()?;
        if geometry.bytes_per_cluster == 0
            || geometry.bytes_per_frs == 0
            || !geometry.bytes_per_frs.is_power_of_two()
            || geometry.bytes_per_cluster < geometry.bytes_per_frs
        {
            return Err(IndexError::UnsupportedVolume(format!(
                "cluster size {} / FRS size {} layout is not supported",
                geometry.bytes_per_cluster, geometry.bytes_per_frs
            )));
        }
        index.set_geometry(&geometry);

        let options = index.options();
        let read_block_size = options.read_block_size.max(geometry.bytes_per_cluster as u64);
        let concurrency = options.io_concurrency.max(1);

        // The bitmap may be unavailable; the scan then runs unskipped with
        // every slot presumed in use.
        let bitmap_chunks = match device.extents(MftStream::Bitmap) {
            Ok(extents) => plan_chunks(&extents, read_block_size, geometry.bytes_per_cluster),
            Err(err) => {
                tracing::warn!(%err, "MFT bitmap unavailable; scanning without skip ranges");
                Vec::new()
            }
        };
        let data_extents = device.extents(MftStream::Data)?;
        if data_extents.is_empty() {
            return Err(IndexError::UnsupportedVolume(
                "volume reports no $MFT::$DATA extents".into(),
            ));
        }
        let data_chunks = plan_chunks(&data_extents, read_block_size, geometry.bytes_per_cluster);

        let bitmap_bytes = (geometry.mft_capacity() as usize).div_ceil(8);
        let job = Arc::new(Self {
            pool,
            index: index.clone(),
            device,
            progress,
            cluster_size: geometry.bytes_per_cluster,
            bitmap_chunks_left: AtomicUsize::new(bitmap_chunks.len()),
            bitmap_chunks,
            data_chunks,
            next_bitmap: AtomicUsize::new(0),
            next_data: AtomicUsize::new(0),
            inflight: AtomicUsize::new(0),
            valid_records: AtomicU32::new(0),
            // Default to all-ones: slots the bitmap never covers are
            // presumed in use.
            mft_bitmap: Mutex::new(vec![0xFF; bitmap_bytes]),
            last_progress_at: AtomicU32::new(0),
        });

        let _ = job.progress.try_send(ScanProgress::Started {
            expected_records: geometry.mft_capacity(),
            cluster_size: geometry.bytes_per_cluster,
            frs_size: geometry.bytes_per_frs,
        });
        tracing::info!(
            volume = %index.root_path(),
            bitmap_chunks = job.bitmap_chunks.len(),
            data_chunks = job.data_chunks.len(),
            expected_records = geometry.mft_capacity(),
            "MFT scan starting"
        );

        for _ in 0..concurrency {
            job.queue_next();
        }
        Ok(job)
    }

    /// Issue the next chunk: bitmap queue first, then data.
    fn queue_next(self: &Arc<Self>) {
        if self.index.cancelled() {
            return;
        }
        let jbitmap = self.next_bitmap.fetch_add(1, Ordering::AcqRel);
        if let Some(chunk) = self.bitmap_chunks.get(jbitmap) {
            self.issue(chunk, true);
            return;
        }
        let jdata = self.next_data.fetch_add(1, Ordering::AcqRel);
        if let Some(chunk) = self.data_chunks.get(jdata) {
            self.issue(chunk, false);
        }
    }

    fn issue(self: &Arc<Self>, chunk: &Chunk, is_bitmap: bool) {
        let (skip_begin, skip_end) = chunk.skips();
        let cluster_size = self.cluster_size as u64;
        let clusters = chunk.cluster_count - skip_begin - skip_end;
        let length = (clusters * cluster_size) as usize;
        let op = ReadOp {
            job: self.clone(),
            virtual_offset: (chunk.vcn + skip_begin) * cluster_size,
            skipped_begin: skip_begin * cluster_size,
            skipped_end: skip_end * cluster_size,
            length,
            is_bitmap,
            started: Instant::now(),
        };
        let offset = ((chunk.lcn + skip_begin as i64) as u64) * cluster_size;
        self.inflight.fetch_add(1, Ordering::AcqRel);
        // Fully-skipped chunks go through the pool as zero-length reads so
        // their completion (and record accounting) still runs off-stack.
        self.pool
            .submit(self.device.clone(), offset, length, Box::new(op));
    }

    /// Called once per retired read. When the last one lands with both
    /// queues exhausted and the scan still unfinished (a volume whose
    /// extents fell short of its declared capacity), finish from here so
    /// waiters are never stranded.
    fn on_op_retired(&self) {
        if self.inflight.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let bitmap_done = self.next_bitmap.load(Ordering::Acquire) >= self.bitmap_chunks.len();
        let data_done = self.next_data.load(Ordering::Acquire) >= self.data_chunks.len();
        if bitmap_done && data_done && !self.index.is_finished() {
            tracing::warn!(
                volume = %self.index.root_path(),
                records = self.index.records_so_far(),
                expected = self.index.mft_capacity(),
                "chunk accounting fell short of capacity; finishing scan"
            );
            self.index.finish_now();
        }
    }

    fn on_bitmap_chunk(&self, virtual_offset: u64, data: &[u8]) {
        let capacity = self.index.mft_capacity() as u64;
        if virtual_offset * 8 <= capacity {
            // Clamp to the slots that exist; the final bitmap cluster can
            // run past the MFT's record count.
            let mut n = data.len();
            if virtual_offset + n as u64 >= capacity / 8 {
                n = (capacity / 8).saturating_sub(virtual_offset) as usize;
            }
            let in_use = count_bits(&data[..n]);
            self.valid_records.fetch_add(in_use, Ordering::AcqRel);
            let mut bitmap = self.mft_bitmap.lock();
            let start = virtual_offset as usize;
            let end = (start + n).min(bitmap.len());
            if start < end {
                bitmap[start..end].copy_from_slice(&data[..end - start]);
            }
        }

        if self.bitmap_chunks_left.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.on_bitmap_complete();
        }
    }

    /// Last bitmap chunk: size the index, then stamp skip ranges onto every
    /// data chunk. Runs before any data chunk that relies on the skips is
    /// issued (release stores pair with the issuance's acquire loads).
    fn on_bitmap_complete(&self) {
        // The exchange guards against a double run if a chunk is retried.
        let valid = self.valid_records.swap(0, Ordering::AcqRel);
        self.index.reserve(valid);

        let frs_size = self.index.frs_size();
        let guard = self.mft_bitmap.lock();
        let bitmap = guard.as_slice();
        self.data_chunks.par_iter().for_each(|chunk| {
            let (begin, end) = compute_skip_clusters(
                bitmap,
                chunk.vcn,
                chunk.cluster_count,
                self.cluster_size,
                frs_size,
            );
            chunk.set_skips(begin, end);
        });
        tracing::debug!(
            volume = %self.index.root_path(),
            valid_records = valid,
            "bitmap stage complete; skip ranges stamped"
        );
    }

    fn on_data_chunk(
        &self,
        virtual_offset: u64,
        data: &mut [u8],
        skipped_begin: u64,
        skipped_end: u64,
    ) {
        self.index.preload(virtual_offset, data);
        let bitmap = self.mft_bitmap.lock();
        let result = self.index.load(
            virtual_offset,
            data,
            skipped_begin,
            skipped_end,
            Some(bitmap.as_slice()),
        );
        drop(bitmap);

        match result {
            Ok(_finished) => self.maybe_report_progress(),
            Err(IndexError::Cancelled) => self.index.set_finished(finish::CANCELLED),
            Err(err) => {
                tracing::error!(%err, "chunk parse failed");
                self.index.record_failure(finish::UNRECOGNIZED_VOLUME);
                self.index.set_finished(self.index.fail_code());
            }
        }
    }

    /// A dropped chunk still advances the record counter so the scan can
    /// finish; the error becomes the scan's finish code.
    fn on_chunk_error(&self, err: &io::Error, is_bitmap: bool, chunk_bytes: u64) {
        if self.index.cancelled() || err.kind() == io::ErrorKind::Interrupted {
            self.index.set_finished(finish::CANCELLED);
            let _ = self.progress.try_send(ScanProgress::Cancelled);
            return;
        }
        let code = finish_code_for(err);
        tracing::warn!(%err, is_bitmap, "chunk read failed; continuing without it");
        self.index.record_failure(code);
        let _ = self.progress.try_send(ScanProgress::Error {
            code,
            message: err.to_string(),
        });

        if is_bitmap {
            if self.bitmap_chunks_left.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.on_bitmap_complete();
            }
        } else {
            // Account the lost records as skipped so end-of-scan triggers.
            let _ = self.index.load(0, &[], chunk_bytes, 0, None);
        }
    }

    fn maybe_report_progress(&self) {
        let done = self.index.records_so_far();
        let interval = self.index.options().progress_interval.max(1);
        let last = self.last_progress_at.load(Ordering::Relaxed);
        if done.saturating_sub(last) >= interval
            && self
                .last_progress_at
                .compare_exchange(last, done, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            let _ = self.progress.try_send(ScanProgress::Update {
                records_so_far: done,
                expected_records: self.index.expected_records(),
            });
        }
    }
}

/// One in-flight chunk read.
struct ReadOp {
    job: Arc<MftReadJob>,
    /// Byte position within the attribute (`vcn * cluster_size`), after
    /// skip trimming.
    virtual_offset: u64,
    skipped_begin: u64,
    skipped_end: u64,
    length: usize,
    is_bitmap: bool,
    started: Instant,
}

impl ReadCompletion for ReadOp {
    fn cancelled(&self) -> bool {
        self.job.index.cancelled()
    }

    fn complete(self: Box<Self>, result: io::Result<Vec<u8>>) {
        let job = self.job.clone();
        if job.index.cancelled() {
            job.index.set_finished(finish::CANCELLED);
            let _ = job.progress.try_send(ScanProgress::Cancelled);
            job.on_op_retired();
            return;
        }

        match result {
            Ok(mut data) => {
                // Keep the disk busy: issue the next chunk before parsing.
                job.queue_next();
                if self.is_bitmap {
                    job.on_bitmap_chunk(self.virtual_offset, &data);
                } else {
                    job.on_data_chunk(
                        self.virtual_offset,
                        &mut data,
                        self.skipped_begin,
                        self.skipped_end,
                    );
                }
                job.index
                    .report_speed(data.len() as u64, self.started.elapsed());
            }
            Err(err) => {
                job.queue_next();
                let chunk_bytes = self.length as u64 + self.skipped_begin + self.skipped_end;
                job.on_chunk_error(&err, self.is_bitmap, chunk_bytes);
            }
        }
        job.on_op_retired();
    }
}
