/// The shared, ascii-directional name buffer.
///
/// All file, link, and stream names on a volume live in one append-only byte
/// vector. A name whose UTF-16 code units are all below 0x80 is stored as
/// raw bytes (one per character); anything else is stored as little-endian
/// 16-bit code units. The per-entry `NameInfo::ascii()` flag says which, so
/// readers reinterpret the same buffer both ways.
use super::record::NameInfo;

/// True when every UTF-16LE code unit in `raw` is plain ASCII.
pub fn is_ascii_utf16le(raw: &[u8]) -> bool {
    raw.chunks_exact(2)
        .all(|pair| u16::from_le_bytes([pair[0], pair[1]]) < 0x80)
}

/// Append a UTF-16LE name to the buffer in its directional encoding.
///
/// Returns the byte offset the name was written at.
pub fn append_directional(names: &mut Vec<u8>, raw_utf16le: &[u8], ascii: bool) -> u32 {
    let offset = names.len() as u32;
    if ascii {
        names.extend(raw_utf16le.chunks_exact(2).map(|pair| pair[0]));
    } else {
        names.extend_from_slice(raw_utf16le);
    }
    offset
}

/// Resolve a `NameInfo` against the buffer it indexes into.
pub fn name_text<'a>(names: &'a [u8], info: &NameInfo) -> NameText<'a> {
    let offset = info.offset() as usize;
    let len = info.length as usize;
    if info.ascii() {
        NameText::Ascii(&names[offset..offset + len])
    } else {
        NameText::Wide(&names[offset..offset + len * 2])
    }
}

/// A borrowed piece of text handed to visitors and matchers.
///
/// `Ascii` and `Wide` come straight out of the names buffer; `Str` is used
/// for paths assembled in a scratch buffer during traversal.
#[derive(Clone, Copy, Debug)]
pub enum NameText<'a> {
    Ascii(&'a [u8]),
    /// Little-endian 16-bit code units, two bytes each.
    Wide(&'a [u8]),
    Str(&'a str),
}

impl<'a> NameText<'a> {
    /// Number of code units (characters for ASCII, UTF-16 units otherwise).
    pub fn len_units(&self) -> usize {
        match self {
            NameText::Ascii(b) => b.len(),
            NameText::Wide(b) => b.len() / 2,
            NameText::Str(s) => s.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            NameText::Ascii(b) => b.is_empty(),
            NameText::Wide(b) => b.is_empty(),
            NameText::Str(s) => s.is_empty(),
        }
    }

    /// Iterate the text as UTF-16 code units regardless of storage encoding.
    pub fn units(&self) -> Units<'a> {
        match *self {
            NameText::Ascii(b) => Units::Ascii(b.iter()),
            NameText::Wide(b) => Units::Wide(b.chunks_exact(2)),
            NameText::Str(s) => Units::Str(s.encode_utf16()),
        }
    }

    /// Decode into a `String`, replacing unpaired surrogates.
    pub fn push_into(&self, out: &mut String) {
        match *self {
            NameText::Ascii(b) => out.extend(b.iter().map(|&c| c as char)),
            NameText::Str(s) => out.push_str(s),
            NameText::Wide(_) => {
                out.extend(
                    char::decode_utf16(self.units()).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)),
                );
            }
        }
    }

    pub fn to_string_lossy(&self) -> String {
        let mut out = String::with_capacity(self.len_units());
        self.push_into(&mut out);
        out
    }

    /// Code-unit comparison that works across the encoding arms
    /// (ascii×ascii, ascii×wide, wide×ascii, wide×wide, and `Str`).
    pub fn cmp_units(&self, other: &NameText<'_>) -> std::cmp::Ordering {
        self.units().cmp(other.units())
    }

    pub fn eq_units(&self, other: &NameText<'_>) -> bool {
        self.units().eq(other.units())
    }

    /// Compare against a UTF-16LE byte slice (attribute names on disk).
    pub fn eq_utf16le(&self, raw: &[u8]) -> bool {
        self.units()
            .eq(raw.chunks_exact(2).map(|p| u16::from_le_bytes([p[0], p[1]])))
    }
}

/// UTF-16 code-unit iterator over any `NameText` variant.
pub enum Units<'a> {
    Ascii(std::slice::Iter<'a, u8>),
    Wide(std::slice::ChunksExact<'a, u8>),
    Str(std::str::EncodeUtf16<'a>),
}

impl Iterator for Units<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        match self {
            Units::Ascii(it) => it.next().map(|&b| b as u16),
            Units::Wide(it) => it.next().map(|p| u16::from_le_bytes([p[0], p[1]])),
            Units::Str(it) => it.next(),
        }
    }
}

/// Encode a `&str` as UTF-16LE bytes (test builders and lookups).
pub fn encode_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}
