/// Full-index enumeration: every (file, hard link, stream) tuple on the
/// volume, with an optional buffered full path per tuple.
///
/// The visitor receives `(text, key, depth)` and returns a traversal token;
/// a positive total across a record's streams recurses into its children.
/// This keeps early-exit and per-level pruning in the caller's hands and
/// allocates nothing per visit beyond the shared path scratch.
use crate::model::key::Key;
use crate::model::names::NameText;
use crate::model::record::NameInfo;
use crate::model::stdinfo::ATTR_DIRECTORY;
use crate::ntfs::{attribute_name, FIRST_USER_FRS, FRS_ROOT, TYPE_ID_DATA};

use super::store::IndexStore;
use super::IndexSnapshot;

/// What `matches` feeds the visitor.
#[derive(Clone, Copy, Debug, Default)]
pub struct MatchOptions {
    /// Pass buffered full paths instead of bare names, suppressing the
    /// root's own name.
    pub match_paths: bool,
    /// Append `:<stream>` suffixes and visit named data streams.
    pub match_streams: bool,
    /// Also visit NTFS internal attributes and system metafiles.
    pub match_attributes: bool,
}

impl IndexSnapshot<'_> {
    /// Enumerate the volume, calling `visitor(text, key, depth)` for every
    /// visible tuple. `scratch` is the reusable path buffer; it must be
    /// empty on entry.
    pub fn matches<F>(&self, visitor: F, scratch: &mut String, opts: MatchOptions)
    where
        F: FnMut(NameText<'_>, Key, usize) -> i32,
    {
        scratch.clear();
        let mut matcher = Matcher {
            store: self.store(),
            visitor,
            opts,
            path: scratch,
            basename_index: 0,
            name: NameInfo::empty(),
            depth: 0,
        };
        matcher.match_tree(FRS_ROOT);
    }
}

struct Matcher<'a, F> {
    store: &'a IndexStore,
    visitor: F,
    opts: MatchOptions,
    path: &'a mut String,
    /// Where the current entry's bare name starts within `path`.
    basename_index: usize,
    /// Bare name of the current entry, for unbuffered visits.
    name: NameInfo,
    depth: usize,
}

impl<F> Matcher<'_, F>
where
    F: FnMut(NameText<'_>, Key, usize) -> i32,
{
    /// Top-level entry: visit each hard link of `frs` (the root) with a
    /// prefix of separator + name, then recurse.
    fn match_tree(&mut self, frs: u32) {
        let Some(rec_idx) = self.store.record_index(frs) else {
            return;
        };
        let links: Vec<NameInfo> = self.store.links_of(rec_idx).map(|l| l.name).collect();
        for (ji, name) in links.iter().enumerate() {
            let old_basename = self.basename_index;
            self.basename_index = self.path.len();
            let mut prefix = String::from("\\");
            if !(self.opts.match_paths && frs == FRS_ROOT) {
                self.store.text(name).push_into(&mut prefix);
            }
            self.match_record(frs, ji as u16, Some(prefix.as_str()));
            self.basename_index = old_basename;
        }
    }

    fn match_record(&mut self, frs: u32, name_info: u16, stream_prefix: Option<&str>) {
        let Some(rec_idx) = self.store.record_index(frs) else {
            return;
        };
        // System metafiles are hidden unless attributes were asked for.
        if !(frs == FRS_ROOT || frs >= FIRST_USER_FRS || self.opts.match_attributes) {
            return;
        }

        let opts = self.opts;
        let match_ps = opts.match_paths || opts.match_streams || opts.match_attributes;
        let buffered = stream_prefix.is_some() || match_ps;
        let record = *self.store.record(rec_idx);
        let is_directory = record.stdinfo.attributes() & ATTR_DIRECTORY != 0;

        let mut traverse: i32 = 0;
        let mut ki: u16 = 0;
        let mut stream_cursor = self.store.first_stream_ref(rec_idx);
        while let Some(sr) = stream_cursor {
            let stream = *self.store.stream(sr);
            stream_cursor = self.store.next_stream_ref(sr);
            let this_ki = ki;
            ki += 1;

            let type_id = stream.type_name_id();
            let is_attribute = type_id != 0 && type_id != TYPE_ID_DATA;
            if is_attribute && !opts.match_attributes {
                continue;
            }

            let old_len = self.path.len();
            if let Some(prefix) = stream_prefix {
                self.path.push_str(prefix);
            }
            if match_ps && is_directory && frs != FRS_ROOT {
                self.path.push('\\');
            }
            if opts.match_streams || opts.match_attributes {
                if stream.name.length > 0 {
                    self.path.push(':');
                    self.store.text(&stream.name).push_into(self.path);
                }
                if is_attribute {
                    if stream.name.length == 0 {
                        self.path.push(':');
                    }
                    self.path.push(':');
                    self.path.push_str(attribute_name(type_id));
                }
            }

            // The root itself is listed at the top level; its attributes
            // would belong one level down.
            let emit = frs != FRS_ROOT || ((self.depth > 0) ^ (type_id == 0));
            if emit {
                let key = Key::new(frs, name_info, this_ki);
                let token = if buffered {
                    let offset = if opts.match_paths {
                        0
                    } else {
                        self.basename_index
                    };
                    (self.visitor)(NameText::Str(&self.path[offset..]), key, self.depth)
                } else {
                    let text = self.store.text(&self.name);
                    (self.visitor)(text, key, self.depth)
                };
                traverse += token;
            }

            if buffered {
                self.path.truncate(old_len);
            }
        }

        if (frs != FRS_ROOT || self.depth == 0) && traverse > 0 {
            self.match_children(frs, rec_idx, buffered, match_ps);
        }
    }

    fn match_children(&mut self, frs: u32, rec_idx: u32, buffered: bool, match_ps: bool) {
        let old_len = self.path.len();
        let old_basename = self.basename_index;
        let old_name = self.name;
        self.depth += 1;
        if buffered {
            if match_ps {
                self.path.push('\\');
            }
            self.basename_index = self.path.len();
        }

        let mut cursor = self.store.record(rec_idx).first_child;
        while cursor != crate::model::record::NONE {
            let child = self.store.child_infos[cursor as usize];
            cursor = child.next;
            if child.record == crate::model::record::NONE {
                break;
            }
            // The root's self-link must not recurse.
            if child.record == frs {
                continue;
            }
            let Some(child_idx) = self.store.record_index(child.record) else {
                continue;
            };
            let name_count = self.store.record(child_idx).name_count;
            // Head-grown list: insertion index inverts to traversal index.
            let Some(target_ji) = name_count.checked_sub(1 + child.name_index) else {
                continue;
            };

            let mut link_cursor = self.store.first_link_ref(child_idx);
            let mut ji: u16 = 0;
            while let Some(lr) = link_cursor {
                let link = *self.store.link(lr);
                link_cursor = self.store.next_link_ref(lr);
                let this_ji = ji;
                ji += 1;
                if link.parent != frs || this_ji != target_ji {
                    continue;
                }
                let name_len_before = self.path.len();
                if buffered {
                    self.store.text(&link.name).push_into(self.path);
                }
                self.name = link.name;
                self.match_record(child.record, this_ji, None);
                if buffered {
                    self.path.truncate(name_len_before);
                }
            }
        }

        self.depth -= 1;
        self.basename_index = old_basename;
        self.name = old_name;
        if buffered {
            self.path.truncate(old_len);
        }
    }
}
