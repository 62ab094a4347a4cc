/// Search results and the sort engine.
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{IndexError, Result};
use crate::index::{IndexSnapshot, NtfsIndex};
use crate::model::key::Key;

/// One search hit: a (volume, key) pair plus the directory depth it was
/// found at (used by the deeper-first sort variation).
#[derive(Clone, Copy, Debug)]
pub struct SearchResult {
    /// Position of the source index among the indexes searched.
    pub index_id: u32,
    pub key: Key,
    pub depth: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortColumn {
    Name,
    Path,
    /// File type derived from the extension.
    TypeString,
    Size,
    SizeOnDisk,
    Created,
    Modified,
    Accessed,
    /// Stream count of the subtree (files sort as 1).
    DescendantCount,
    Attributes,
}

/// Modifiers applied on top of the column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortVariation {
    /// Pre-compare on depth, deepest first.
    pub deeper_first: bool,
    /// `SizeOnDisk` sorts by `length - allocated` (compression savings).
    pub space_saved: bool,
    /// `SizeOnDisk` sorts by the bulkiness rollup.
    pub by_bulkiness: bool,
}

/// Tracks the current sort so a repeated request on the same column and
/// variation toggles descending order.
#[derive(Default, Debug)]
pub struct SortState {
    current: Option<(SortColumn, SortVariation)>,
    reverse: bool,
}

impl SortState {
    /// Register a sort request; returns whether it should be descending.
    pub fn request(&mut self, column: SortColumn, variation: SortVariation) -> bool {
        if self.current == Some((column, variation)) {
            self.reverse = !self.reverse;
        } else {
            self.current = Some((column, variation));
            self.reverse = false;
        }
        self.reverse
    }

    pub fn reverse(&self) -> bool {
        self.reverse
    }
}

/// Receives sort progress; returning false cancels the operation.
pub trait SortProgress: Sync {
    fn report(&self, done: usize, total: usize) -> bool;
}

/// Sink for callers that don't track progress.
pub struct NoProgress;

impl SortProgress for NoProgress {
    fn report(&self, _done: usize, _total: usize) -> bool {
        true
    }
}

enum SortKey {
    Text(String),
    Number(u64),
}

impl SortKey {
    fn cmp(&self, other: &SortKey) -> std::cmp::Ordering {
        match (self, other) {
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Number(b)) => a.cmp(b),
            // Mixed keys cannot happen within one column.
            (SortKey::Text(_), SortKey::Number(_)) => std::cmp::Ordering::Less,
            (SortKey::Number(_), SortKey::Text(_)) => std::cmp::Ordering::Greater,
        }
    }
}

const PROGRESS_STRIDE: usize = 1024;

/// Sort `results` in place by `column` with the given variation.
///
/// Sort keys are extracted up front (that is where the path rendering cost
/// lives), reporting progress and polling cancellation every
/// `PROGRESS_STRIDE` results; the comparison pass is pure afterwards.
pub fn sort_results(
    results: &mut [SearchResult],
    indexes: &[Arc<NtfsIndex>],
    column: SortColumn,
    variation: SortVariation,
    reverse: bool,
    progress: &dyn SortProgress,
) -> Result<()> {
    // Lock each distinct index once: a duplicate entry must reuse the
    // existing snapshot rather than re-acquire the lock.
    let mut snapshots: Vec<IndexSnapshot<'_>> = Vec::new();
    let mut snapshot_of: Vec<usize> = Vec::with_capacity(indexes.len());
    for (i, index) in indexes.iter().enumerate() {
        match indexes[..i].iter().position(|seen| Arc::ptr_eq(seen, index)) {
            Some(j) => snapshot_of.push(snapshot_of[j]),
            None => {
                snapshot_of.push(snapshots.len());
                snapshots.push(index.read());
            }
        }
    }

    let total = results.len();
    let mut keys: Vec<SortKey> = Vec::with_capacity(total);
    let mut scratch = String::new();
    for (done, result) in results.iter().enumerate() {
        if done % PROGRESS_STRIDE == 0 && !progress.report(done, total) {
            return Err(IndexError::Cancelled);
        }
        let snapshot = snapshot_of
            .get(result.index_id as usize)
            .map(|&j| &snapshots[j])
            .ok_or(IndexError::InvalidKey)?;
        keys.push(extract_key(snapshot, result, column, variation, &mut scratch)?);
    }

    let mut order: Vec<u32> = (0..total as u32).collect();
    order.sort_unstable_by(|&a, &b| {
        let (ra, rb) = (&results[a as usize], &results[b as usize]);
        let mut ordering = if variation.deeper_first {
            rb.depth.cmp(&ra.depth)
        } else {
            std::cmp::Ordering::Equal
        };
        if ordering == std::cmp::Ordering::Equal {
            ordering = keys[a as usize].cmp(&keys[b as usize]);
        }
        if reverse {
            ordering.reverse()
        } else {
            ordering
        }
    });

    // Apply the permutation.
    let sorted: Vec<SearchResult> = order.iter().map(|&i| results[i as usize]).collect();
    results.copy_from_slice(&sorted);
    progress.report(total, total);
    Ok(())
}

fn extract_key(
    snapshot: &IndexSnapshot<'_>,
    result: &SearchResult,
    column: SortColumn,
    variation: SortVariation,
    scratch: &mut String,
) -> Result<SortKey> {
    let key = result.key;
    Ok(match column {
        SortColumn::Name => {
            scratch.clear();
            snapshot.get_path(key, scratch, true)?;
            SortKey::Text(scratch.to_lowercase())
        }
        SortColumn::Path => {
            scratch.clear();
            snapshot.get_path(key, scratch, false)?;
            SortKey::Text(scratch.to_lowercase())
        }
        SortColumn::TypeString => {
            scratch.clear();
            snapshot.get_path(key, scratch, true)?;
            SortKey::Text(type_string(scratch))
        }
        SortColumn::Size => SortKey::Number(snapshot.get_sizes(key)?.length.get()),
        SortColumn::SizeOnDisk => {
            let sizes = snapshot.get_sizes(key)?;
            let value = if variation.by_bulkiness {
                sizes.bulkiness.get()
            } else if variation.space_saved {
                sizes.length.get().saturating_sub(sizes.allocated.get())
            } else {
                sizes.allocated.get()
            };
            SortKey::Number(value)
        }
        SortColumn::Created => SortKey::Number(snapshot.get_stdinfo(key.frs())?.created),
        SortColumn::Modified => SortKey::Number(snapshot.get_stdinfo(key.frs())?.written),
        SortColumn::Accessed => SortKey::Number(snapshot.get_stdinfo(key.frs())?.accessed()),
        SortColumn::DescendantCount => SortKey::Number(snapshot.get_sizes(key)?.treesize as u64),
        SortColumn::Attributes => {
            SortKey::Number(snapshot.get_stdinfo(key.frs())?.attributes() as u64)
        }
    })
}

/// Extension-derived type string; directories and extensionless names sort
/// ahead of everything with an extension.
fn type_string(name: &str) -> String {
    let trimmed = name.trim_end_matches('\\');
    match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_sort_toggles_reverse() {
        let mut state = SortState::default();
        let v = SortVariation::default();
        assert!(!state.request(SortColumn::Name, v));
        assert!(state.request(SortColumn::Name, v));
        assert!(!state.request(SortColumn::Name, v));
        // Switching column resets to ascending.
        state.request(SortColumn::Name, v);
        assert!(!state.request(SortColumn::Size, v));
        // Changing only the variation also resets.
        let deeper = SortVariation {
            deeper_first: true,
            ..Default::default()
        };
        assert!(state.request(SortColumn::Size, v));
        assert!(!state.request(SortColumn::Size, deeper));
    }

    #[test]
    fn type_string_extracts_extensions() {
        assert_eq!(type_string("report.TXT"), "txt");
        assert_eq!(type_string("archive.tar.gz"), "gz");
        assert_eq!(type_string("Makefile"), "");
        assert_eq!(type_string(".gitignore"), "");
        assert_eq!(type_string("folder\\"), "");
    }
}
