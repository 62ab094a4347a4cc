/// MFT record parsing: turning fixed-up FRS buffers into index entries.
///
/// `preload_chunk` runs lock-free on the completion worker — it applies the
/// multi-sector fixup and finds the highest base FRS the chunk will touch so
/// the records table can be grown once instead of per record. The parse
/// itself mutates shared index state and runs under the store's write lock.
use crate::model::key::{MAX_NAMES_PER_RECORD, MAX_STREAMS_PER_RECORD};
use crate::model::names::{append_directional, is_ascii_utf16le, NameText};
use crate::model::record::{ChildInfo, NONE};
use crate::model::stdinfo::ATTR_DIRECTORY;
use crate::ntfs::attr::{AttrHeader, FileNameInformation, StandardInformation, FILE_NAME_DOS};
use crate::ntfs::header::{apply_fixup, FrsHeader};
use crate::ntfs::runs::MappingPairs;
use crate::ntfs::{self, type_name_id};

use super::store::{IndexStore, StreamRef};

/// Per-chunk parse context: geometry and zone bounds captured from the
/// index's atomics before taking the write lock.
pub(crate) struct ParseContext<'a> {
    pub frs_size: u32,
    pub mft_zone_start: i64,
    pub mft_zone_end: i64,
    /// In-use bitmap for orphan marking (one bit per FRS), when available.
    pub bitmap: Option<&'a [u8]>,
}

/// Deltas accumulated while parsing one chunk; applied to the index's
/// atomic counters after the write lock is released.
#[derive(Default, Debug)]
pub(crate) struct ParseOutcome {
    pub records_seen: u32,
    pub reserved_clusters_delta: i64,
    pub names_and_streams_delta: u64,
}

/// Fix up every record in the chunk and return one-past the highest base
/// FRS it will merge into, so the caller can pre-size the records table.
///
/// A record whose fixup fails gets its magic poisoned here, which makes the
/// parse pass skip it.
pub(crate) fn preload_chunk(virtual_offset: u64, buf: &mut [u8], frs_size: u32) -> Option<u32> {
    debug_assert!(frs_size.is_power_of_two(), "FRS size not a power of 2");
    let frs_size_log2 = frs_size.trailing_zeros();
    let frs_usize = frs_size as usize;
    let mut max_frs_plus_one: u32 = 0;

    let mut i = chunk_lead_in(virtual_offset, frs_size);
    while i + frs_usize <= buf.len() {
        let frs = ((virtual_offset + i as u64) >> frs_size_log2) as u32;
        let rec = &mut buf[i..i + frs_usize];
        if FrsHeader::new(rec).magic_ok() && apply_fixup(rec) {
            let base = FrsHeader::new(rec).base_frs();
            let frs_base = if base != 0 { base as u32 } else { frs };
            max_frs_plus_one = max_frs_plus_one.max(frs_base + 1);
        }
        i += frs_usize;
    }

    (max_frs_plus_one > 0).then_some(max_frs_plus_one)
}

/// Subtract from the reserved-cluster pool any run that lands inside the
/// MFT zone; that space is already counted as reserved.
fn account_mft_zone(ah: &AttrHeader<'_>, ctx: &ParseContext<'_>, outcome: &mut ParseOutcome) {
    if ctx.mft_zone_start >= ctx.mft_zone_end {
        return;
    }
    for run in MappingPairs::new(ah.mapping_pairs(), ah.lowest_vcn() as i64) {
        if run.is_hole {
            continue;
        }
        let begin = run.lcn.max(ctx.mft_zone_start);
        let end = (run.lcn + run.cluster_count() as i64).min(ctx.mft_zone_end);
        if begin < end {
            outcome.reserved_clusters_delta -= end - begin;
        }
    }
}

/// Offset of the first whole record in a chunk. Non-zero only when the
/// chunk starts mid-record, which the run planner rejects up front.
fn chunk_lead_in(virtual_offset: u64, frs_size: u32) -> usize {
    let mask = (frs_size - 1) as u64;
    if virtual_offset & mask != 0 {
        (frs_size as u64 - (virtual_offset & mask)) as usize
    } else {
        0
    }
}

impl IndexStore {
    /// Parse one fixed-up chunk of FRS records into the store.
    ///
    /// Caller holds the write lock. `virtual_offset` is the chunk's byte
    /// position within `$MFT::$DATA`.
    pub(crate) fn parse_chunk(
        &mut self,
        virtual_offset: u64,
        buf: &[u8],
        ctx: &ParseContext<'_>,
    ) -> ParseOutcome {
        let frs_size = ctx.frs_size as usize;
        let frs_size_log2 = ctx.frs_size.trailing_zeros();
        let mut outcome = ParseOutcome::default();

        let mut i = chunk_lead_in(virtual_offset, ctx.frs_size);
        while i + frs_size <= buf.len() {
            let frs = ((virtual_offset + i as u64) >> frs_size_log2) as u32;
            self.parse_record(frs, &buf[i..i + frs_size], ctx, &mut outcome);
            outcome.records_seen += 1;
            i += frs_size;
        }
        outcome
    }

    fn parse_record(
        &mut self,
        frs: u32,
        rec_buf: &[u8],
        ctx: &ParseContext<'_>,
        outcome: &mut ParseOutcome,
    ) {
        let header = FrsHeader::new(rec_buf);
        if !header.magic_ok() || !header.is_in_use() {
            return;
        }

        let base = header.base_frs();
        let frs_base = if base != 0 { base as u32 } else { frs };
        let base_idx = self.ensure_record(frs_base);
        let frsh_is_directory = header.is_directory();

        let first = header.first_attribute_offset();
        if first < 0x18 || first >= rec_buf.len() {
            return; // corrupt record; skip, scan continues
        }

        let mut attrs = &rec_buf[first..];
        while let Some(ah) = AttrHeader::parse(attrs) {
            match ah.type_code() {
                ntfs::ATTR_STANDARD_INFORMATION => {
                    if let Some(si) = ah.resident_value().and_then(StandardInformation::parse) {
                        let rec = self.record_mut(base_idx);
                        rec.stdinfo.created = si.created;
                        rec.stdinfo.written = si.written;
                        rec.stdinfo.set_accessed(si.accessed);
                        rec.stdinfo.set_attributes(
                            si.file_attributes
                                | if frsh_is_directory { ATTR_DIRECTORY } else { 0 },
                        );
                    }
                }
                ntfs::ATTR_FILE_NAME => {
                    if let Some(fname) = ah.resident_value().and_then(FileNameInformation::parse) {
                        if fname.namespace != FILE_NAME_DOS {
                            self.add_name(base_idx, frs_base, &fname, outcome);
                        }
                    }
                }
                _ => {
                    if ah.is_non_resident() {
                        account_mft_zone(&ah, ctx, outcome);
                    }
                    // Only the first segment of a non-resident attribute
                    // carries the sizes; continuation segments are covered
                    // by their base record merge.
                    let is_primary = !(ah.is_non_resident() && ah.lowest_vcn() != 0);
                    if is_primary {
                        self.add_stream(base_idx, frs_base, &ah, outcome);
                    }
                }
            }
            attrs = ah.rest();
        }

        if let Some(bitmap) = ctx.bitmap {
            let byte = (frs / 8) as usize;
            let in_use = bitmap
                .get(byte)
                .is_some_and(|b| b & (1 << (frs % 8)) != 0);
            if !in_use {
                self.record_mut(base_idx).stdinfo.set_orphan(true);
            }
        }
    }

    fn add_name(
        &mut self,
        base_idx: u32,
        frs_base: u32,
        fname: &FileNameInformation<'_>,
        outcome: &mut ParseOutcome,
    ) {
        let parent_frs = fname.parent_frs as u32;
        {
            let rec = self.record(base_idx);
            if rec.name_count >= MAX_NAMES_PER_RECORD {
                tracing::debug!(frs = frs_base, "hard link cap reached; name dropped");
                return;
            }
        }

        // Grow the singly-linked name list at the head: push the old head
        // into the shared vector, then overwrite the embedded head.
        if self.record(base_idx).first_name.name.is_set() {
            let old_head = self.record(base_idx).first_name;
            let link_index = self.name_infos.len() as u32;
            self.name_infos.push(old_head);
            self.record_mut(base_idx).first_name.next = link_index;
        }

        let ascii = is_ascii_utf16le(fname.name);
        let offset = append_directional(&mut self.names, fname.name, ascii);
        let name_index;
        {
            let rec = self.record_mut(base_idx);
            rec.first_name.name.set_offset(offset);
            rec.first_name.name.set_ascii(ascii);
            rec.first_name.name.length = fname.name_length() as u8;
            rec.first_name.parent = parent_frs;
            name_index = rec.name_count;
        }

        // Every link gets a membership entry under its parent — including
        // the root's self-link, which traversal filters out.
        let parent_idx = self.ensure_record(parent_frs);
        let child_index = self.child_infos.len() as u32;
        let first_child = self.record(parent_idx).first_child;
        self.child_infos.push(ChildInfo {
            next: first_child,
            record: frs_base,
            name_index,
        });
        self.record_mut(parent_idx).first_child = child_index;

        // Each new name multiplies the (name, stream) result count.
        outcome.names_and_streams_delta += self.record(base_idx).stream_count as u64;
        self.record_mut(base_idx).name_count += 1;
    }

    fn add_stream(
        &mut self,
        base_idx: u32,
        frs_base: u32,
        ah: &AttrHeader<'_>,
        outcome: &mut ParseOutcome,
    ) {
        let type_code = ah.type_code();
        // `$I30` index components (Bitmap / IndexRoot / IndexAllocation)
        // collapse into one nameless directory pseudo-stream.
        let is_dir_index = matches!(
            type_code,
            ntfs::ATTR_BITMAP | ntfs::ATTR_INDEX_ROOT | ntfs::ATTR_INDEX_ALLOCATION
        ) && ah.name_length() == 4
            && NameText::Str("$I30").eq_utf16le(ah.name());

        let name_length = if is_dir_index { 0 } else { ah.name_length() as u8 };
        let type_id = if is_dir_index { 0 } else { type_name_id(type_code) };

        // For `$I30` components, merge into the already-present pseudo-stream.
        let mut target: Option<StreamRef> = None;
        if self.first_stream_ref(base_idx).is_some() && is_dir_index {
            let mut cursor = self.first_stream_ref(base_idx);
            while let Some(r) = cursor {
                let k = self.stream(r);
                let matches_name = k.name.length == name_length
                    && (name_length == 0 || self.text(&k.name).eq_utf16le(ah.name()));
                if k.type_name_id() == type_id && matches_name {
                    target = Some(r);
                    break;
                }
                cursor = self.next_stream_ref(r);
            }
        }

        let target = match target {
            Some(r) => r,
            None => {
                if self.record(base_idx).stream_count >= MAX_STREAMS_PER_RECORD {
                    tracing::debug!(frs = frs_base, "stream cap reached; stream dropped");
                    return;
                }
                if self.first_stream_ref(base_idx).is_some() {
                    let old_head = self.record(base_idx).first_stream;
                    let stream_index = self.stream_infos.len() as u32;
                    self.stream_infos.push(old_head);
                    self.record_mut(base_idx).first_stream.next = stream_index;
                } else {
                    self.record_mut(base_idx).first_stream.next = NONE;
                }

                let (offset, ascii) = if is_dir_index {
                    (0, false) // name suppressed; offset 0 marks the head live
                } else {
                    let ascii = is_ascii_utf16le(ah.name());
                    (append_directional(&mut self.names, ah.name(), ascii), ascii)
                };
                {
                    let rec = self.record_mut(base_idx);
                    let head = &mut rec.first_stream;
                    head.sizes = Default::default();
                    head.set_sparse(false);
                    head.set_allocated_accounted_in_main_stream(false);
                    head.set_type_name_id(type_id);
                    head.name.length = name_length;
                    head.name.set_offset(offset);
                    head.name.set_ascii(ascii);
                    rec.stream_count += 1;
                }
                outcome.names_and_streams_delta += self.record(base_idx).name_count as u64;
                StreamRef::Embedded(base_idx)
            }
        };

        // `$BadClus::$Bad` spans the whole volume; its initialized size is
        // the closest available approximation of the actual bad extent.
        let is_badclus_bad = frs_base == ntfs::FRS_BADCLUS
            && ah.name_length() == 4
            && NameText::Str("$Bad").eq_utf16le(ah.name());

        let allocated = if ah.is_non_resident() {
            if ah.compression_unit() != 0 {
                ah.compressed_size()
            } else if is_badclus_bad {
                ah.initialized_size()
            } else {
                ah.allocated_size()
            }
        } else {
            0
        };
        let length = if ah.is_non_resident() {
            if is_badclus_bad {
                ah.initialized_size()
            } else {
                ah.data_size()
            }
        } else {
            ah.resident_value_length()
        };

        let is_sparse = ah.is_sparse();
        let stream = self.stream_mut(target);
        if is_sparse {
            stream.set_sparse(true);
        }
        stream.sizes.length.add(length);
        stream.sizes.allocated.add(allocated);
        let total_allocated = stream.sizes.allocated.get();
        stream.sizes.bulkiness.add(total_allocated);
        stream.sizes.treesize = u32::from(is_dir_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_lead_in_aligns_to_record_boundaries() {
        assert_eq!(chunk_lead_in(0, 1024), 0);
        assert_eq!(chunk_lead_in(4096, 1024), 0);
        assert_eq!(chunk_lead_in(4096 + 512, 1024), 512);
    }
}
