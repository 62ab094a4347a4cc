/// The query engine: pattern search over one or more finalized indexes,
/// with sortable results.
pub mod pattern;
pub mod results;

use std::sync::Arc;

use crate::error::Result;
use crate::index::visit::MatchOptions;
use crate::index::NtfsIndex;

pub use pattern::{PatternKind, PatternMatcher, PatternSpec};
pub use results::{
    sort_results, NoProgress, SearchResult, SortColumn, SortProgress, SortState, SortVariation,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchOptions {
    /// Match against full paths instead of bare names.
    pub match_paths: bool,
    /// Include named data streams (`file:stream`).
    pub match_streams: bool,
    /// Include NTFS internal attributes and system metafiles.
    pub match_attributes: bool,
    /// Stop collecting after this many hits.
    pub max_results: Option<usize>,
}

/// Search every index for entries matching `spec`.
///
/// `index_id` in each result is the position within `indexes`. An index
/// appearing more than once in the slice is searched (and locked) only
/// once — its later duplicates are skipped.
pub fn search(
    indexes: &[Arc<NtfsIndex>],
    spec: &PatternSpec,
    options: &SearchOptions,
) -> Result<Vec<SearchResult>> {
    let mut matcher = spec.compile()?;
    let mut results = Vec::new();
    let mut scratch = String::new();
    let max = options.max_results.unwrap_or(usize::MAX);

    for (id, index) in indexes.iter().enumerate() {
        if indexes[..id].iter().any(|seen| Arc::ptr_eq(seen, index)) {
            continue;
        }
        let snapshot = index.read();
        let mut full = results.len() >= max;
        snapshot.matches(
            |text, key, depth| {
                if full {
                    return 0;
                }
                if matcher.is_match(text) {
                    results.push(SearchResult {
                        index_id: id as u32,
                        key,
                        depth: depth as u16,
                    });
                    if results.len() >= max {
                        full = true;
                        return 0;
                    }
                }
                1
            },
            &mut scratch,
            MatchOptions {
                match_paths: options.match_paths,
                match_streams: options.match_streams,
                match_attributes: options.match_attributes,
            },
        );
        if results.len() >= max {
            break;
        }
    }
    Ok(results)
}
