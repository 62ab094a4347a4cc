/// Key resolution and full-path rendering.
use crate::error::{IndexError, Result};
use crate::model::key::{Key, NONE_IDX};
use crate::model::names::NameText;
use crate::model::record::{LinkInfo, Record, StreamInfo};
use crate::model::SizeInfo;
use crate::model::StandardInfo;
use crate::ntfs::{attribute_name, FRS_ROOT, TYPE_ID_DATA};

use super::IndexSnapshot;

/// Resolved pointers for one key: the record plus the specific hard link
/// and stream the key addresses.
pub struct FilePointers<'a> {
    pub record: &'a Record,
    pub link: &'a LinkInfo,
    pub stream: &'a StreamInfo,
}

impl FilePointers<'_> {
    /// Key of the parent directory, with name and stream left unspecified
    /// (path reconstruction always uses an ancestor's first name).
    pub fn parent_key(&self) -> Key {
        Key::new(self.link.parent, NONE_IDX, NONE_IDX)
    }
}

/// One piece of a rendered path, in the leaf-to-root emission order used by
/// the parent walk; rendering iterates the collected parts in reverse.
enum PathPart<'a> {
    Sep,
    Colon,
    Text(NameText<'a>),
    Attr(&'static str),
}

impl IndexSnapshot<'_> {
    /// Standard information of a record by FRS number.
    pub fn get_stdinfo(&self, frs: u32) -> Result<StandardInfo> {
        self.store()
            .find(frs)
            .map(|r| r.stdinfo)
            .ok_or(IndexError::InvalidKey)
    }

    /// Sizes of the stream a key addresses.
    pub fn get_sizes(&self, key: Key) -> Result<SizeInfo> {
        Ok(self.file_pointers(key)?.stream.sizes)
    }

    /// Resolve a key to its record / link / stream pointers.
    ///
    /// A `NONE_IDX` name matches any link; a `NONE_IDX` stream matches the
    /// default (directory pseudo) stream. Fails with `InvalidKey` when no
    /// (name, stream) pair on the record matches.
    pub fn file_pointers(&self, key: Key) -> Result<FilePointers<'_>> {
        let store = self.store();
        let rec_idx = store.record_index(key.frs()).ok_or(IndexError::InvalidKey)?;
        let record = store.record(rec_idx);

        let want_name = key.name_info();
        let mut link_cursor = store.first_link_ref(rec_idx);
        let mut ji: u16 = 0;
        while let Some(lr) = link_cursor {
            if want_name == NONE_IDX || ji == want_name {
                let want_stream = key.stream_info();
                let mut stream_cursor = store.first_stream_ref(rec_idx);
                let mut ki: u16 = 0;
                while let Some(sr) = stream_cursor {
                    let stream = store.stream(sr);
                    let is_match = if want_stream == NONE_IDX {
                        stream.type_name_id() == 0
                    } else {
                        ki == want_stream
                    };
                    if is_match {
                        return Ok(FilePointers {
                            record,
                            link: store.link(lr),
                            stream,
                        });
                    }
                    stream_cursor = store.next_stream_ref(sr);
                    ki += 1;
                }
            }
            link_cursor = store.next_link_ref(lr);
            ji += 1;
        }
        Err(IndexError::InvalidKey)
    }

    /// Render the full path of a key into `out`, returning the number of
    /// bytes appended.
    ///
    /// The stream suffix is `:<name>` for a named data stream and
    /// `:<name>:<attribute-type>` (or `::<attribute-type>` when unnamed)
    /// for non-data attributes. Directories get a trailing separator. With
    /// `name_only`, only the leaf component (plus suffix) is rendered and
    /// the volume root path is not prepended.
    pub fn get_path(&self, key: Key, out: &mut String, name_only: bool) -> Result<usize> {
        let old_len = out.len();
        let mut parts: Vec<PathPart<'_>> = Vec::new();
        self.collect_parts(key, name_only, &mut parts)?;

        if !name_only {
            out.push_str(self.index.root_path());
            if !parts.is_empty() && !out.ends_with(['\\', '/']) {
                out.push('\\');
            }
        }
        for part in parts.iter().rev() {
            match part {
                PathPart::Sep => out.push('\\'),
                PathPart::Colon => out.push(':'),
                PathPart::Attr(name) => out.push_str(name),
                PathPart::Text(text) => text.push_into(out),
            }
        }
        Ok(out.len() - old_len)
    }

    /// Walk from the key to the root, emitting parts leaf-first. This is
    /// the inverse order of the final path; `get_path` re-reverses.
    fn collect_parts<'a>(
        &'a self,
        key: Key,
        name_only: bool,
        parts: &mut Vec<PathPart<'a>>,
    ) -> Result<()> {
        let store = self.store();
        let mut key = key;
        let mut iteration: u32 = 0;
        loop {
            let ptrs = self.file_pointers(key)?;
            let is_root = key.frs() == FRS_ROOT;
            let type_id = ptrs.stream.type_name_id();

            // Directory levels contribute their trailing separator.
            if !is_root && type_id == 0 {
                parts.push(PathPart::Sep);
            }

            if iteration == 0 {
                let is_attribute = type_id != 0 && type_id != TYPE_ID_DATA;
                if is_attribute {
                    parts.push(PathPart::Attr(attribute_name(type_id)));
                    parts.push(PathPart::Colon);
                }
                if ptrs.stream.name.length > 0 {
                    parts.push(PathPart::Text(store.text(&ptrs.stream.name)));
                }
                if ptrs.stream.name.length > 0 || is_attribute {
                    parts.push(PathPart::Colon);
                }
            }

            if iteration == 0 || !is_root {
                let text = store.text(&ptrs.link.name);
                // The root names itself "."; that component is dropped from
                // full paths but kept when only the bare name was asked for.
                let is_dot = ptrs.link.name.length == 1 && text.units().eq([b'.' as u16]);
                if !is_dot || name_only {
                    parts.push(PathPart::Text(text));
                }
            }

            if is_root || name_only {
                return Ok(());
            }
            key = ptrs.parent_key();
            iteration += 1;
        }
    }
}
