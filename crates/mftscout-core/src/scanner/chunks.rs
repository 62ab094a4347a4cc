/// The run planner: splitting `$MFT` extent lists into fixed-size read
/// chunks.
///
/// Each chunk is one contiguous disk read. After the bitmap stage, a chunk
/// carries skip counts for leading and trailing clusters that hold only
/// unallocated records, so the data pass reads the shortened range.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::platform::volume::Extent;

pub struct Chunk {
    /// Position within the attribute, in clusters.
    pub vcn: u64,
    /// Clusters in this chunk before skip trimming.
    pub cluster_count: u64,
    /// Position on the volume.
    pub lcn: i64,
    /// Leading all-free clusters, written by the bitmap stage.
    skip_begin: AtomicU64,
    /// Trailing all-free clusters, written by the bitmap stage.
    skip_end: AtomicU64,
}

impl Chunk {
    pub fn new(vcn: u64, cluster_count: u64, lcn: i64) -> Self {
        Self {
            vcn,
            cluster_count,
            lcn,
            skip_begin: AtomicU64::new(0),
            skip_end: AtomicU64::new(0),
        }
    }

    /// `(skip_begin, skip_end)` with acquire ordering: an issuance that
    /// reads these sees either zeros or the bitmap stage's final values.
    pub fn skips(&self) -> (u64, u64) {
        (
            self.skip_begin.load(Ordering::Acquire),
            self.skip_end.load(Ordering::Acquire),
        )
    }

    pub fn set_skips(&self, begin: u64, end: u64) {
        debug_assert!(
            begin + end <= self.cluster_count,
            "skipping more clusters than the chunk holds"
        );
        self.skip_begin.store(begin, Ordering::Release);
        self.skip_end.store(end, Ordering::Release);
    }
}

/// Split an extent list into chunks of at most `read_block_size` bytes.
///
/// The extent list is a sequence of `(next_vcn, lcn)` transitions as
/// returned by the retrieval-pointer query: entry `i` covers VCNs from the
/// previous entry's `next_vcn` up to its own, starting at `lcn`.
pub fn plan_chunks(extents: &[Extent], read_block_size: u64, cluster_size: u32) -> Vec<Chunk> {
    let clusters_per_chunk = 1 + (read_block_size.saturating_sub(1)) / cluster_size.max(1) as u64;
    let mut chunks = Vec::new();
    let mut prev_vcn: u64 = 0;
    for extent in extents {
        let mut offset: u64 = 0;
        while prev_vcn < extent.next_vcn {
            let n = (extent.next_vcn - prev_vcn).min(clusters_per_chunk);
            chunks.push(Chunk::new(prev_vcn, n, extent.lcn + offset as i64));
            prev_vcn += n;
            offset += n;
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTER: u32 = 4096;

    #[test]
    fn single_small_extent_is_one_chunk() {
        let chunks = plan_chunks(
            &[Extent {
                next_vcn: 8,
                lcn: 1000,
            }],
            1 << 20,
            CLUSTER,
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].vcn, 0);
        assert_eq!(chunks[0].cluster_count, 8);
        assert_eq!(chunks[0].lcn, 1000);
    }

    #[test]
    fn large_extent_splits_at_the_block_size() {
        // 1 MiB = 256 clusters of 4 KiB; 600 clusters → 256 + 256 + 88.
        let chunks = plan_chunks(
            &[Extent {
                next_vcn: 600,
                lcn: 5000,
            }],
            1 << 20,
            CLUSTER,
        );
        let counts: Vec<u64> = chunks.iter().map(|c| c.cluster_count).collect();
        assert_eq!(counts, vec![256, 256, 88]);
        assert_eq!(chunks[1].vcn, 256);
        assert_eq!(chunks[1].lcn, 5256);
        assert_eq!(chunks[2].lcn, 5512);
    }

    #[test]
    fn fragmented_extents_keep_vcn_continuity() {
        let chunks = plan_chunks(
            &[
                Extent {
                    next_vcn: 4,
                    lcn: 100,
                },
                Extent {
                    next_vcn: 10,
                    lcn: 9000,
                },
            ],
            1 << 20,
            CLUSTER,
        );
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].vcn, chunks[0].cluster_count), (0, 4));
        assert_eq!((chunks[1].vcn, chunks[1].cluster_count), (4, 6));
        assert_eq!(chunks[1].lcn, 9000);
    }

    #[test]
    fn skips_default_to_zero_and_round_trip() {
        let chunk = Chunk::new(0, 16, 0);
        assert_eq!(chunk.skips(), (0, 0));
        chunk.set_skips(3, 5);
        assert_eq!(chunk.skips(), (3, 5));
    }
}
