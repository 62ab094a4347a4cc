/// `ATTRIBUTE_RECORD_HEADER` plus the resident attribute values the index
/// cares about (`$STANDARD_INFORMATION`, `$FILE_NAME`).
use super::{read_u16, read_u32, read_u64};

/// Attribute flag bit: the stream is sparse.
pub const ATTR_FLAG_SPARSE: u16 = 0x8000;

/// `$FILE_NAME` namespace byte for DOS 8.3 short names; those links are not
/// indexed.
pub const FILE_NAME_DOS: u8 = 0x02;

const OFF_TYPE: usize = 0;
const OFF_RECORD_LENGTH: usize = 4;
const OFF_FORM_CODE: usize = 8;
const OFF_NAME_LENGTH: usize = 9;
const OFF_NAME_OFFSET: usize = 10;
const OFF_FLAGS: usize = 12;

// Resident form.
const OFF_VALUE_LENGTH: usize = 16;
const OFF_VALUE_OFFSET: usize = 20;

// Non-resident form.
const OFF_LOWEST_VCN: usize = 16;
const OFF_MAPPING_PAIRS_OFFSET: usize = 32;
const OFF_COMPRESSION_UNIT: usize = 34;
const OFF_ALLOCATED_SIZE: usize = 40;
const OFF_DATA_SIZE: usize = 48;
const OFF_INITIALIZED_SIZE: usize = 56;
const OFF_COMPRESSED_SIZE: usize = 64;

/// View over one attribute record within an FRS buffer.
///
/// `buf` runs from the attribute's first byte to the end of the record, so
/// every field read is bounds-checked against what is actually present.
#[derive(Clone, Copy)]
pub struct AttrHeader<'a> {
    buf: &'a [u8],
}

impl<'a> AttrHeader<'a> {
    /// Interpret `buf` as an attribute record. Returns `None` at the
    /// attribute-list terminator or when the header overruns the record.
    pub fn parse(buf: &'a [u8]) -> Option<Self> {
        let type_code = read_u32(buf, OFF_TYPE)?;
        if type_code == super::ATTR_END || type_code == 0 {
            return None;
        }
        let ah = Self { buf };
        let len = ah.record_length();
        if len < 16 || len > buf.len() {
            return None;
        }
        Some(ah)
    }

    pub fn type_code(&self) -> u32 {
        read_u32(self.buf, OFF_TYPE).unwrap_or(super::ATTR_END)
    }

    pub fn record_length(&self) -> usize {
        read_u32(self.buf, OFF_RECORD_LENGTH).unwrap_or(0) as usize
    }

    pub fn is_non_resident(&self) -> bool {
        self.buf.get(OFF_FORM_CODE).copied().unwrap_or(0) != 0
    }

    /// Name length in UTF-16 code units.
    pub fn name_length(&self) -> usize {
        self.buf.get(OFF_NAME_LENGTH).copied().unwrap_or(0) as usize
    }

    /// The attribute name as raw UTF-16LE bytes (empty when unnamed).
    pub fn name(&self) -> &'a [u8] {
        let off = read_u16(self.buf, OFF_NAME_OFFSET).unwrap_or(0) as usize;
        let len = self.name_length() * 2;
        self.buf.get(off..off + len).unwrap_or(&[])
    }

    pub fn flags(&self) -> u16 {
        read_u16(self.buf, OFF_FLAGS).unwrap_or(0)
    }

    pub fn is_sparse(&self) -> bool {
        self.flags() & ATTR_FLAG_SPARSE != 0
    }

    /// Resident value bytes; `None` for non-resident attributes or when the
    /// value overruns the record.
    pub fn resident_value(&self) -> Option<&'a [u8]> {
        if self.is_non_resident() {
            return None;
        }
        let len = read_u32(self.buf, OFF_VALUE_LENGTH)? as usize;
        let off = read_u16(self.buf, OFF_VALUE_OFFSET)? as usize;
        self.buf.get(off..off + len)
    }

    pub fn resident_value_length(&self) -> u64 {
        if self.is_non_resident() {
            0
        } else {
            read_u32(self.buf, OFF_VALUE_LENGTH).unwrap_or(0) as u64
        }
    }

    pub fn lowest_vcn(&self) -> u64 {
        read_u64(self.buf, OFF_LOWEST_VCN).unwrap_or(0)
    }

    pub fn compression_unit(&self) -> u8 {
        self.buf.get(OFF_COMPRESSION_UNIT).copied().unwrap_or(0)
    }

    pub fn allocated_size(&self) -> u64 {
        read_u64(self.buf, OFF_ALLOCATED_SIZE).unwrap_or(0)
    }

    pub fn data_size(&self) -> u64 {
        read_u64(self.buf, OFF_DATA_SIZE).unwrap_or(0)
    }

    pub fn initialized_size(&self) -> u64 {
        read_u64(self.buf, OFF_INITIALIZED_SIZE).unwrap_or(0)
    }

    /// Only meaningful when `compression_unit() != 0`.
    pub fn compressed_size(&self) -> u64 {
        read_u64(self.buf, OFF_COMPRESSED_SIZE).unwrap_or(0)
    }

    /// The mapping-pairs byte stream of a non-resident attribute.
    pub fn mapping_pairs(&self) -> &'a [u8] {
        let off = read_u16(self.buf, OFF_MAPPING_PAIRS_OFFSET).unwrap_or(0) as usize;
        let end = self.record_length().min(self.buf.len());
        self.buf.get(off..end).unwrap_or(&[])
    }

    /// Slice holding the next attribute onward.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.record_length().min(self.buf.len())..]
    }
}

/// `$STANDARD_INFORMATION` resident value.
pub struct StandardInformation {
    pub created: u64,
    pub written: u64,
    pub accessed: u64,
    pub file_attributes: u32,
}

impl StandardInformation {
    pub fn parse(value: &[u8]) -> Option<Self> {
        Some(Self {
            created: read_u64(value, 0)?,
            written: read_u64(value, 8)?,
            accessed: read_u64(value, 24)?,
            file_attributes: read_u32(value, 32)?,
        })
    }
}

/// `$FILE_NAME` resident value.
pub struct FileNameInformation<'a> {
    /// Parent FRS with the sequence word masked off.
    pub parent_frs: u64,
    /// Namespace byte; `FILE_NAME_DOS` entries are skipped by the indexer.
    pub namespace: u8,
    /// The name as raw UTF-16LE bytes.
    pub name: &'a [u8],
}

impl<'a> FileNameInformation<'a> {
    pub fn parse(value: &'a [u8]) -> Option<Self> {
        let parent = read_u64(value, 0)? & 0x0000_FFFF_FFFF_FFFF;
        let name_length = *value.get(64)? as usize;
        let namespace = *value.get(65)?;
        let name = value.get(66..66 + name_length * 2)?;
        Some(Self {
            parent_frs: parent,
            namespace,
            name,
        })
    }

    /// Name length in UTF-16 code units.
    pub fn name_length(&self) -> usize {
        self.name.len() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::names::encode_utf16le;

    fn resident_attr(type_code: u32, name: &str, value: &[u8]) -> Vec<u8> {
        let name_bytes = encode_utf16le(name);
        let name_off = 24usize;
        let value_off = name_off + name_bytes.len();
        let total = value_off + value.len();
        let mut buf = vec![0u8; total.next_multiple_of(8)];
        buf[0..4].copy_from_slice(&type_code.to_le_bytes());
        let buf_len = buf.len() as u32;
        buf[4..8].copy_from_slice(&buf_len.to_le_bytes());
        buf[8] = 0; // resident
        buf[9] = name.encode_utf16().count() as u8;
        buf[10..12].copy_from_slice(&(name_off as u16).to_le_bytes());
        buf[16..20].copy_from_slice(&(value.len() as u32).to_le_bytes());
        buf[20..22].copy_from_slice(&(value_off as u16).to_le_bytes());
        buf[name_off..name_off + name_bytes.len()].copy_from_slice(&name_bytes);
        buf[value_off..value_off + value.len()].copy_from_slice(value);
        buf
    }

    #[test]
    fn resident_attribute_fields() {
        let buf = resident_attr(super::super::ATTR_DATA, "notes", b"hello");
        let ah = AttrHeader::parse(&buf).unwrap();
        assert_eq!(ah.type_code(), super::super::ATTR_DATA);
        assert!(!ah.is_non_resident());
        assert_eq!(ah.resident_value().unwrap(), b"hello");
        assert_eq!(ah.resident_value_length(), 5);
        assert_eq!(ah.name(), encode_utf16le("notes").as_slice());
    }

    #[test]
    fn terminator_yields_none() {
        let mut buf = vec![0u8; 8];
        buf[0..4].copy_from_slice(&super::super::ATTR_END.to_le_bytes());
        assert!(AttrHeader::parse(&buf).is_none());
    }

    #[test]
    fn overlong_attribute_is_rejected() {
        let mut buf = resident_attr(super::super::ATTR_DATA, "", b"x");
        // Claim a record length past the end of the buffer.
        let claimed_len = buf.len() as u32 + 64;
        buf[4..8].copy_from_slice(&claimed_len.to_le_bytes());
        assert!(AttrHeader::parse(&buf).is_none());
    }

    #[test]
    fn file_name_information_parses() {
        let name = encode_utf16le("report.txt");
        let mut value = vec![0u8; 66 + name.len()];
        value[0..8].copy_from_slice(&0x1234_0000_0000_0005u64.to_le_bytes());
        value[64] = (name.len() / 2) as u8;
        value[65] = 0x01; // Win32 namespace
        value[66..].copy_from_slice(&name);
        let fni = FileNameInformation::parse(&value).unwrap();
        assert_eq!(fni.parent_frs, 5);
        assert_eq!(fni.namespace, 0x01);
        assert_eq!(fni.name, name.as_slice());
        assert_eq!(fni.name_length(), 10);
    }

    #[test]
    fn standard_information_parses() {
        let mut value = vec![0u8; 48];
        value[0..8].copy_from_slice(&100u64.to_le_bytes());
        value[8..16].copy_from_slice(&200u64.to_le_bytes());
        value[24..32].copy_from_slice(&300u64.to_le_bytes());
        value[32..36].copy_from_slice(&0x21u32.to_le_bytes());
        let si = StandardInformation::parse(&value).unwrap();
        assert_eq!(si.created, 100);
        assert_eq!(si.written, 200);
        assert_eq!(si.accessed, 300);
        assert_eq!(si.file_attributes, 0x21);
    }
}
