/// The index arena: every record, link, stream, and child entry on a volume
/// in six flat vectors.
///
/// Records live in a dense array; `lookup` maps FRS numbers to record
/// indices (sentinel-marked sparse vector). The first name and stream of a
/// record are embedded in the `Record` itself; overflow entries live in the
/// shared `name_infos` / `stream_infos` vectors, linked head-first.
use crate::model::names::{name_text, NameText};
use crate::model::record::{ChildInfo, LinkInfo, NameInfo, Record, StreamInfo, NONE};

#[derive(Default)]
pub struct IndexStore {
    pub(crate) names: Vec<u8>,
    pub(crate) records: Vec<Record>,
    pub(crate) lookup: Vec<u32>,
    pub(crate) name_infos: Vec<LinkInfo>,
    pub(crate) stream_infos: Vec<StreamInfo>,
    pub(crate) child_infos: Vec<ChildInfo>,
}

/// Handle to a stream entry: either the head embedded in a record or an
/// overflow slot in `stream_infos`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StreamRef {
    Embedded(u32),
    Heap(u32),
}

/// Handle to a link entry, same shape as `StreamRef`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LinkRef {
    Embedded(u32),
    Heap(u32),
}

impl IndexStore {
    /// Record index for `frs`, allocating the slot (and the lookup range up
    /// to it) on first touch.
    pub(crate) fn ensure_record(&mut self, frs: u32) -> u32 {
        let slot = frs as usize;
        if slot >= self.lookup.len() {
            self.lookup.resize(slot + 1, NONE);
        }
        if self.lookup[slot] == NONE {
            self.lookup[slot] = self.records.len() as u32;
            self.records.push(Record::default());
        }
        self.lookup[slot]
    }

    pub fn record_index(&self, frs: u32) -> Option<u32> {
        match self.lookup.get(frs as usize) {
            Some(&idx) if idx != NONE => Some(idx),
            _ => None,
        }
    }

    pub fn find(&self, frs: u32) -> Option<&Record> {
        self.record_index(frs).map(|i| &self.records[i as usize])
    }

    #[inline]
    pub(crate) fn record(&self, idx: u32) -> &Record {
        &self.records[idx as usize]
    }

    #[inline]
    pub(crate) fn record_mut(&mut self, idx: u32) -> &mut Record {
        &mut self.records[idx as usize]
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Highest FRS slot the lookup table covers (exclusive).
    pub fn lookup_len(&self) -> usize {
        self.lookup.len()
    }

    pub fn name_count(&self) -> usize {
        self.name_infos.len()
    }

    /// Resolve a name against the shared buffer.
    pub fn text<'a>(&'a self, info: &NameInfo) -> NameText<'a> {
        name_text(&self.names, info)
    }

    // ── Stream list walking ─────────────────────────────────────────────

    pub(crate) fn first_stream_ref(&self, rec_idx: u32) -> Option<StreamRef> {
        let rec = self.record(rec_idx);
        if rec.first_stream.name.is_set() {
            Some(StreamRef::Embedded(rec_idx))
        } else {
            None
        }
    }

    pub(crate) fn next_stream_ref(&self, r: StreamRef) -> Option<StreamRef> {
        let next = { self.stream(r).next };
        if next == NONE {
            None
        } else {
            Some(StreamRef::Heap(next))
        }
    }

    pub(crate) fn stream(&self, r: StreamRef) -> &StreamInfo {
        match r {
            StreamRef::Embedded(rec) => &self.records[rec as usize].first_stream,
            StreamRef::Heap(i) => &self.stream_infos[i as usize],
        }
    }

    pub(crate) fn stream_mut(&mut self, r: StreamRef) -> &mut StreamInfo {
        match r {
            StreamRef::Embedded(rec) => &mut self.records[rec as usize].first_stream,
            StreamRef::Heap(i) => &mut self.stream_infos[i as usize],
        }
    }

    /// Collect the stream refs of a record in traversal order.
    pub(crate) fn stream_refs(&self, rec_idx: u32) -> Vec<StreamRef> {
        let mut out = Vec::with_capacity(self.record(rec_idx).stream_count as usize);
        let mut cursor = self.first_stream_ref(rec_idx);
        while let Some(r) = cursor {
            out.push(r);
            cursor = self.next_stream_ref(r);
        }
        out
    }

    // ── Name (hard link) list walking ───────────────────────────────────

    pub(crate) fn first_link_ref(&self, rec_idx: u32) -> Option<LinkRef> {
        let rec = self.record(rec_idx);
        if rec.first_name.name.is_set() {
            Some(LinkRef::Embedded(rec_idx))
        } else {
            None
        }
    }

    pub(crate) fn next_link_ref(&self, r: LinkRef) -> Option<LinkRef> {
        let next = { self.link(r).next };
        if next == NONE {
            None
        } else {
            Some(LinkRef::Heap(next))
        }
    }

    pub(crate) fn link(&self, r: LinkRef) -> &LinkInfo {
        match r {
            LinkRef::Embedded(rec) => &self.records[rec as usize].first_name,
            LinkRef::Heap(i) => &self.name_infos[i as usize],
        }
    }

    /// Iterate a record's links in traversal order (most recent first).
    pub(crate) fn links_of(&self, rec_idx: u32) -> LinkIter<'_> {
        LinkIter {
            store: self,
            cursor: self.first_link_ref(rec_idx),
        }
    }

    // ── Child list walking ──────────────────────────────────────────────

    /// Iterate a directory's child entries. Stops at the list terminator or
    /// at an unfilled entry.
    pub(crate) fn children_of(&self, rec_idx: u32) -> ChildIter<'_> {
        ChildIter {
            store: self,
            cursor: self.record(rec_idx).first_child,
        }
    }

    // ── Capacity ────────────────────────────────────────────────────────

    /// Pre-size every arena for `records` in-use FRS slots.
    ///
    /// Best-effort: an allocation failure downgrades to dynamic growth
    /// rather than aborting the scan. The ratios come from measured
    /// per-volume averages — a bit over one link per record, one overflow
    /// stream per four records, ~23 name bytes per record.
    pub(crate) fn reserve(&mut self, records: u32) {
        let records = records as usize;
        if self.lookup.len() >= records {
            return;
        }
        let wanted: [(&str, Result<(), std::collections::TryReserveError>); 5] = [
            ("name_infos", self.name_infos.try_reserve(records + records / 16)),
            ("stream_infos", self.stream_infos.try_reserve(records / 4)),
            ("child_infos", self.child_infos.try_reserve(records + records / 2)),
            ("names", self.names.try_reserve(records * 23)),
            ("records", self.records.try_reserve(records + records / 4)),
        ];
        for (what, result) in wanted {
            if let Err(err) = result {
                tracing::warn!(%what, %err, "index reserve failed; continuing unreserved");
            }
        }
        self.lookup.resize(records, NONE);
    }
}

pub(crate) struct LinkIter<'a> {
    store: &'a IndexStore,
    cursor: Option<LinkRef>,
}

impl<'a> Iterator for LinkIter<'a> {
    type Item = &'a LinkInfo;

    fn next(&mut self) -> Option<&'a LinkInfo> {
        let r = self.cursor?;
        self.cursor = self.store.next_link_ref(r);
        Some(self.store.link(r))
    }
}

pub(crate) struct ChildIter<'a> {
    store: &'a IndexStore,
    cursor: u32,
}

impl Iterator for ChildIter<'_> {
    type Item = ChildInfo;

    fn next(&mut self) -> Option<ChildInfo> {
        if self.cursor == NONE {
            return None;
        }
        let entry = self.store.child_infos[self.cursor as usize];
        self.cursor = entry.next;
        if entry.record == NONE {
            return None;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_record_is_idempotent() {
        let mut store = IndexStore::default();
        let a = store.ensure_record(40);
        let b = store.ensure_record(40);
        assert_eq!(a, b);
        assert_eq!(store.record_count(), 1);
        assert_eq!(store.lookup.len(), 41);
        assert!(store.record_index(39).is_none());
    }

    #[test]
    fn lookup_is_bijective_over_allocated_slots() {
        let mut store = IndexStore::default();
        let indices: Vec<u32> = [5u32, 16, 16, 100, 5]
            .iter()
            .map(|&frs| store.ensure_record(frs))
            .collect();
        assert_eq!(indices[0], indices[4]);
        assert_eq!(indices[1], indices[2]);
        let mut unique = indices.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert_eq!(store.record_count(), 3);
    }

    #[test]
    fn empty_record_has_no_lists() {
        let mut store = IndexStore::default();
        let idx = store.ensure_record(7);
        assert!(store.first_stream_ref(idx).is_none());
        assert!(store.links_of(idx).next().is_none());
        assert!(store.children_of(idx).next().is_none());
    }

    #[test]
    fn reserve_sizes_the_lookup_table() {
        let mut store = IndexStore::default();
        store.reserve(1000);
        assert_eq!(store.lookup.len(), 1000);
        assert!(store.lookup.iter().all(|&v| v == NONE));
        // Re-reserving smaller is a no-op.
        store.reserve(10);
        assert_eq!(store.lookup.len(), 1000);
    }
}
