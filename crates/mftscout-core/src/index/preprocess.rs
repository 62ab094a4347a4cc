/// Post-scan preprocessing: one depth-first post-order walk from the root
/// that rolls subtree sizes, stream counts, and the bulkiness metric up
/// into every directory's pseudo-stream.
use crate::model::names::NameText;
use crate::model::record::NONE;
use crate::ntfs::{FRS_ROOT, TYPE_ID_DATA};

use super::store::{IndexStore, StreamRef};

/// Subtree totals carried up the walk. Plain `u64` math here; the packed
/// 48-bit form is only for storage.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Rollup {
    pub length: u64,
    pub allocated: u64,
    pub bulkiness: u64,
    pub treesize: u32,
}

impl Rollup {
    fn accumulate(&mut self, other: Rollup) {
        self.length += other.length;
        self.allocated += other.allocated;
        self.bulkiness += other.bulkiness;
        self.treesize += other.treesize;
    }
}

pub(crate) struct Preprocessor<'a> {
    store: &'a mut IndexStore,
    /// Child bulkiness values of the directory currently being rolled up;
    /// shared across recursion levels, windowed by saved length.
    scratch: Vec<u64>,
    depth: usize,
    cluster_size: u32,
    reserved_clusters: i64,
    bulkiness_divisor: u64,
    streams_done: u32,
}

impl<'a> Preprocessor<'a> {
    pub(crate) fn new(
        store: &'a mut IndexStore,
        cluster_size: u32,
        reserved_clusters: i64,
        bulkiness_divisor: u64,
    ) -> Self {
        Self {
            store,
            scratch: Vec::new(),
            depth: 0,
            cluster_size,
            reserved_clusters,
            bulkiness_divisor: bulkiness_divisor.max(1),
            streams_done: 0,
        }
    }

    /// Walk the tree from the root. Returns the number of streams visited
    /// (for the `preprocessed_so_far` counter).
    pub(crate) fn run(&mut self) -> u32 {
        let root = self.store.record_index(FRS_ROOT);
        self.visit(root, 0, 1);
        self.streams_done
    }

    /// Integer-exact even split of `value` across `n` hard links: summing
    /// `delta(value, i, n)` for i in 0..n yields exactly `value`.
    fn delta(value: u64, i: u16, n: u16) -> u64 {
        let n = n.max(1) as u64;
        let i = i as u64;
        value * (i + 1) / n - value * i / n
    }

    fn visit(&mut self, rec_idx: Option<u32>, name_info: u16, total_names: u16) -> Rollup {
        let Some(idx) = rec_idx else {
            return Rollup::default();
        };
        let scratch_base = self.scratch.len();

        // Children first.
        let mut children = Rollup::default();
        self.depth += 1;
        let mut cursor = self.store.record(idx).first_child;
        while cursor != NONE {
            let child = self.store.child_infos[cursor as usize];
            cursor = child.next;
            if child.record == NONE {
                break;
            }
            let child_idx = self.store.record_index(child.record);
            // The root is the only record that is a child of itself.
            if child_idx == Some(idx) {
                continue;
            }
            let (link_pos, link_total) = match child_idx {
                Some(ci) => {
                    let n = self.store.record(ci).name_count;
                    // Lists grow at the head, so insertion order inverts.
                    (n.saturating_sub(1 + child.name_index), n.max(1))
                }
                None => (0, 1),
            };
            let sub = self.visit(child_idx, link_pos, link_total);
            self.scratch.push(sub.bulkiness);
            children.accumulate(sub);
        }
        self.depth -= 1;

        // Children whose bulkiness falls under 1/Nth of the directory's
        // allocated total are noise and drop out of the metric.
        let threshold = children.allocated / self.bulkiness_divisor;
        for &value in &self.scratch[scratch_base..] {
            if value < threshold {
                children.bulkiness -= value;
            }
        }

        if self.depth == 0 {
            // Pre-reserved clusters count toward the volume's used space.
            children.allocated = children
                .allocated
                .saturating_add_signed(self.reserved_clusters * self.cluster_size as i64);
        }

        let mut result = children;

        // Stream pass: split each stream's sizes evenly across the
        // record's hard links, fold subtree totals into the directory
        // pseudo-stream, and track the compression-reparse merge pair.
        let mut default_stream: Option<StreamRef> = None;
        let mut merge_stream: Option<StreamRef> = None;
        let mut default_allocated_delta: u64 = 0;
        let mut merge_allocated_delta: u64 = 0;

        let refs = self.store.stream_refs(idx);
        for r in refs {
            let k = *self.store.stream(r);
            let is_data = k.type_name_id() == TYPE_ID_DATA;
            let is_default = is_data && k.name.length == 0;

            let allocated_value = if k.is_allocated_accounted_in_main_stream() {
                0
            } else {
                k.sizes.allocated.get()
            };
            let allocated_delta = Self::delta(allocated_value, name_info, total_names);
            let bulkiness_delta = Self::delta(k.sizes.bulkiness.get(), name_info, total_names);

            if is_default {
                default_stream = Some(r);
                default_allocated_delta += allocated_delta;
            }

            let is_compression_reparse = is_data
                && k.name.length as usize == "WofCompressedData".len()
                && self
                    .store
                    .text(&k.name)
                    .eq_units(&NameText::Str("WofCompressedData"));
            let length_value = if is_compression_reparse {
                0
            } else {
                k.sizes.length.get()
            };
            let length_delta = Self::delta(length_value, name_info, total_names);

            if is_compression_reparse && !k.is_allocated_accounted_in_main_stream() {
                merge_stream = Some(r);
                merge_allocated_delta += allocated_delta;
            }

            result.length += length_delta;
            result.allocated += allocated_delta;
            result.bulkiness += bulkiness_delta;
            result.treesize += 1;

            if k.type_name_id() == 0 {
                let stream = self.store.stream_mut(r);
                stream.sizes.length.add(children.length);
                stream.sizes.allocated.add(children.allocated);
                stream.sizes.bulkiness.add(children.bulkiness);
                stream.sizes.treesize += children.treesize;
            }

            self.streams_done += 1;
        }

        // A `WofCompressedData` stream holds the on-disk bytes of the
        // (zero-allocated) default stream; move its allocation onto the
        // default stream so the pair is not double counted.
        if let (Some(merge), Some(default)) = (merge_stream, default_stream) {
            self.store
                .stream_mut(merge)
                .set_allocated_accounted_in_main_stream(true);
            let merged_allocated = self.store.stream(merge).sizes.allocated.get();
            let default_mut = self.store.stream_mut(default);
            default_mut.sizes.allocated.add(merged_allocated);
            let new_default_allocated = default_mut.sizes.allocated.get();

            result.allocated -= default_allocated_delta;
            result.allocated -= merge_allocated_delta;
            result.allocated += Self::delta(new_default_allocated, name_info, total_names);
        }

        self.scratch.truncate(scratch_base);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_split_is_exact_for_all_n() {
        for n in 1..=32u16 {
            for value in [0u64, 1, 999, 1000, 1 << 40] {
                let total: u64 = (0..n).map(|i| Preprocessor::delta(value, i, n)).sum();
                assert_eq!(total, value, "value={value} n={n}");
            }
        }
    }

    #[test]
    fn delta_single_owner_takes_everything() {
        assert_eq!(Preprocessor::delta(12345, 0, 1), 12345);
    }
}
