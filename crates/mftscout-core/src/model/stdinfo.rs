/// Compact representation of the NTFS `$STANDARD_INFORMATION` attribute.
///
/// Timestamps are raw FILETIME values (100 ns ticks since 1601-01-01 UTC).
/// The access time is truncated to 58 bits (good until the year 2514) so
/// the fifteen attribute flags pack beside it without growing the record.
use chrono::{DateTime, TimeZone, Utc};

// FILE_ATTRIBUTE_* bits as persisted on records and surfaced to hosts.
pub const ATTR_READONLY: u32 = 0x0000_0001;
pub const ATTR_HIDDEN: u32 = 0x0000_0002;
pub const ATTR_SYSTEM: u32 = 0x0000_0004;
pub const ATTR_DIRECTORY: u32 = 0x0000_0010;
pub const ATTR_ARCHIVE: u32 = 0x0000_0020;
pub const ATTR_SPARSE_FILE: u32 = 0x0000_0200;
pub const ATTR_REPARSE_POINT: u32 = 0x0000_0400;
pub const ATTR_COMPRESSED: u32 = 0x0000_0800;
pub const ATTR_OFFLINE: u32 = 0x0000_1000;
pub const ATTR_NOT_CONTENT_INDEXED: u32 = 0x0000_2000;
pub const ATTR_ENCRYPTED: u32 = 0x0000_4000;
pub const ATTR_INTEGRITY_STREAM: u32 = 0x0000_8000;
pub const ATTR_NO_SCRUB_DATA: u32 = 0x0002_0000;
pub const ATTR_PINNED: u32 = 0x0008_0000;
pub const ATTR_UNPINNED: u32 = 0x0010_0000;
/// Synthetic: the record was in use but its MFT bitmap bit was clear.
pub const ATTR_ORPHANED: u32 = 0x4000_0000;

// Internal flag bit positions (16 bits total, including the orphan mark).
const F_READONLY: u16 = 1 << 0;
const F_ARCHIVE: u16 = 1 << 1;
const F_SYSTEM: u16 = 1 << 2;
const F_HIDDEN: u16 = 1 << 3;
const F_OFFLINE: u16 = 1 << 4;
const F_NOT_CONTENT_INDEXED: u16 = 1 << 5;
const F_NO_SCRUB_DATA: u16 = 1 << 6;
const F_INTEGRITY_STREAM: u16 = 1 << 7;
const F_PINNED: u16 = 1 << 8;
const F_UNPINNED: u16 = 1 << 9;
const F_DIRECTORY: u16 = 1 << 10;
const F_COMPRESSED: u16 = 1 << 11;
const F_ENCRYPTED: u16 = 1 << 12;
const F_SPARSE: u16 = 1 << 13;
const F_REPARSE_POINT: u16 = 1 << 14;
const F_ORPHANED: u16 = 1 << 15;

const ACCESSED_BITS: u64 = (1 << 58) - 1;

#[derive(Clone, Copy, Default, Debug)]
#[repr(C, packed)]
pub struct StandardInfo {
    pub created: u64,
    pub written: u64,
    accessed: u64,
    flags: u16,
}

impl StandardInfo {
    #[inline]
    pub fn accessed(&self) -> u64 {
        self.accessed
    }

    #[inline]
    pub fn set_accessed(&mut self, value: u64) {
        self.accessed = value & ACCESSED_BITS;
    }

    /// Attributes as a FILE_ATTRIBUTE_* bitmask.
    pub fn attributes(&self) -> u32 {
        let f = self.flags;
        let mut out = 0;
        if f & F_READONLY != 0 {
            out |= ATTR_READONLY;
        }
        if f & F_ARCHIVE != 0 {
            out |= ATTR_ARCHIVE;
        }
        if f & F_SYSTEM != 0 {
            out |= ATTR_SYSTEM;
        }
        if f & F_HIDDEN != 0 {
            out |= ATTR_HIDDEN;
        }
        if f & F_OFFLINE != 0 {
            out |= ATTR_OFFLINE;
        }
        if f & F_NOT_CONTENT_INDEXED != 0 {
            out |= ATTR_NOT_CONTENT_INDEXED;
        }
        if f & F_NO_SCRUB_DATA != 0 {
            out |= ATTR_NO_SCRUB_DATA;
        }
        if f & F_INTEGRITY_STREAM != 0 {
            out |= ATTR_INTEGRITY_STREAM;
        }
        if f & F_PINNED != 0 {
            out |= ATTR_PINNED;
        }
        if f & F_UNPINNED != 0 {
            out |= ATTR_UNPINNED;
        }
        if f & F_DIRECTORY != 0 {
            out |= ATTR_DIRECTORY;
        }
        if f & F_COMPRESSED != 0 {
            out |= ATTR_COMPRESSED;
        }
        if f & F_ENCRYPTED != 0 {
            out |= ATTR_ENCRYPTED;
        }
        if f & F_SPARSE != 0 {
            out |= ATTR_SPARSE_FILE;
        }
        if f & F_REPARSE_POINT != 0 {
            out |= ATTR_REPARSE_POINT;
        }
        if f & F_ORPHANED != 0 {
            out |= ATTR_ORPHANED;
        }
        out
    }

    /// Set attributes from a FILE_ATTRIBUTE_* bitmask.
    ///
    /// The synthetic orphan mark is preserved; it is owned by the parser,
    /// not by the on-disk attribute value.
    pub fn set_attributes(&mut self, value: u32) {
        let mut f = self.flags & F_ORPHANED;
        if value & ATTR_READONLY != 0 {
            f |= F_READONLY;
        }
        if value & ATTR_ARCHIVE != 0 {
            f |= F_ARCHIVE;
        }
        if value & ATTR_SYSTEM != 0 {
            f |= F_SYSTEM;
        }
        if value & ATTR_HIDDEN != 0 {
            f |= F_HIDDEN;
        }
        if value & ATTR_OFFLINE != 0 {
            f |= F_OFFLINE;
        }
        if value & ATTR_NOT_CONTENT_INDEXED != 0 {
            f |= F_NOT_CONTENT_INDEXED;
        }
        if value & ATTR_NO_SCRUB_DATA != 0 {
            f |= F_NO_SCRUB_DATA;
        }
        if value & ATTR_INTEGRITY_STREAM != 0 {
            f |= F_INTEGRITY_STREAM;
        }
        if value & ATTR_PINNED != 0 {
            f |= F_PINNED;
        }
        if value & ATTR_UNPINNED != 0 {
            f |= F_UNPINNED;
        }
        if value & ATTR_DIRECTORY != 0 {
            f |= F_DIRECTORY;
        }
        if value & ATTR_COMPRESSED != 0 {
            f |= F_COMPRESSED;
        }
        if value & ATTR_ENCRYPTED != 0 {
            f |= F_ENCRYPTED;
        }
        if value & ATTR_SPARSE_FILE != 0 {
            f |= F_SPARSE;
        }
        if value & ATTR_REPARSE_POINT != 0 {
            f |= F_REPARSE_POINT;
        }
        self.flags = f;
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.flags & F_DIRECTORY != 0
    }

    #[inline]
    pub fn is_orphan(&self) -> bool {
        self.flags & F_ORPHANED != 0
    }

    #[inline]
    pub fn set_orphan(&mut self, value: bool) {
        if value {
            self.flags |= F_ORPHANED;
        } else {
            self.flags &= !F_ORPHANED;
        }
    }

    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.created)
    }

    pub fn written_time(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.written)
    }

    pub fn accessed_time(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.accessed())
    }
}

/// Seconds between the FILETIME epoch (1601) and the Unix epoch (1970).
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;

/// Convert a FILETIME tick count to a UTC timestamp. Zero maps to `None`.
pub fn filetime_to_datetime(ticks: u64) -> Option<DateTime<Utc>> {
    if ticks == 0 {
        return None;
    }
    let secs = (ticks / 10_000_000) as i64 - FILETIME_UNIX_OFFSET_SECS;
    let nanos = ((ticks % 10_000_000) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}
