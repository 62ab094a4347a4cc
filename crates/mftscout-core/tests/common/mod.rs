//! Synthetic NTFS volume fixtures.
//!
//! Tests build a real MFT image — FRS records with fixups, attributes, and
//! mapping pairs, plus the `$MFT` bitmap — inside a flat byte vector, then
//! serve it through an in-memory `VolumeDevice`. The whole scan pipeline
//! (pool, run planner, bitmap stage, parser, preprocessor) runs against it
//! exactly as it would against `\\.\C:`.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mftscout_core::model::names::encode_utf16le;
use mftscout_core::ntfs;
use mftscout_core::ntfs::runs::encode_mapping_pairs;
use mftscout_core::platform::volume::{Extent, MftStream, VolumeDevice, VolumeGeometry};

pub const CLUSTER_SIZE: u32 = 4096;
pub const FRS_SIZE: u32 = 1024;

/// LCN where the bitmap clusters live in the image.
const BITMAP_LCN: i64 = 8;
/// LCN where the MFT data clusters live in the image.
const MFT_LCN: i64 = 64;

const FRH_IN_USE: u16 = 0x0001;
const FRH_DIRECTORY: u16 = 0x0002;

// ── Attribute encoding ──────────────────────────────────────────────────────

fn align8(n: usize) -> usize {
    n.next_multiple_of(8)
}

/// Encode a resident attribute record.
pub fn resident_attr(type_code: u32, name: &str, value: &[u8], flags: u16) -> Vec<u8> {
    let name_bytes = encode_utf16le(name);
    let name_off = 24usize;
    let value_off = align8(name_off + name_bytes.len());
    let total = align8(value_off + value.len());

    let mut buf = vec![0u8; total];
    buf[0..4].copy_from_slice(&type_code.to_le_bytes());
    buf[4..8].copy_from_slice(&(total as u32).to_le_bytes());
    buf[8] = 0; // resident
    buf[9] = (name_bytes.len() / 2) as u8;
    buf[10..12].copy_from_slice(&(name_off as u16).to_le_bytes());
    buf[12..14].copy_from_slice(&flags.to_le_bytes());
    buf[16..20].copy_from_slice(&(value.len() as u32).to_le_bytes());
    buf[20..22].copy_from_slice(&(value_off as u16).to_le_bytes());
    buf[name_off..name_off + name_bytes.len()].copy_from_slice(&name_bytes);
    buf[value_off..value_off + value.len()].copy_from_slice(value);
    buf
}

/// Size fields of a non-resident attribute.
#[derive(Clone, Copy, Default)]
pub struct NonResidentSizes {
    pub allocated: u64,
    pub data: u64,
    pub initialized: u64,
    /// `Some((unit, size))` marks the stream compressed.
    pub compressed: Option<(u8, u64)>,
}

/// Encode a non-resident attribute record (first segment, `LowestVCN` 0
/// unless overridden).
pub fn nonresident_attr(
    type_code: u32,
    name: &str,
    sizes: NonResidentSizes,
    runs: &[(i64, Option<i64>)],
    flags: u16,
    lowest_vcn: u64,
) -> Vec<u8> {
    let name_bytes = encode_utf16le(name);
    let fixed = if sizes.compressed.is_some() { 72 } else { 64 };
    let name_off = fixed;
    let pairs_off = align8(name_off + name_bytes.len());
    let pairs = encode_mapping_pairs(runs);
    let total = align8(pairs_off + pairs.len());

    let highest_vcn = runs
        .iter()
        .map(|&(count, _)| count)
        .sum::<i64>()
        .saturating_sub(1);

    let mut buf = vec![0u8; total];
    buf[0..4].copy_from_slice(&type_code.to_le_bytes());
    buf[4..8].copy_from_slice(&(total as u32).to_le_bytes());
    buf[8] = 1; // non-resident
    buf[9] = (name_bytes.len() / 2) as u8;
    buf[10..12].copy_from_slice(&(name_off as u16).to_le_bytes());
    buf[12..14].copy_from_slice(&flags.to_le_bytes());
    buf[16..24].copy_from_slice(&lowest_vcn.to_le_bytes());
    buf[24..32].copy_from_slice(&(highest_vcn.max(0) as u64).to_le_bytes());
    buf[32..34].copy_from_slice(&(pairs_off as u16).to_le_bytes());
    buf[34] = sizes.compressed.map_or(0, |(unit, _)| unit);
    buf[40..48].copy_from_slice(&sizes.allocated.to_le_bytes());
    buf[48..56].copy_from_slice(&sizes.data.to_le_bytes());
    buf[56..64].copy_from_slice(&sizes.initialized.to_le_bytes());
    if let Some((_, compressed_size)) = sizes.compressed {
        buf[64..72].copy_from_slice(&compressed_size.to_le_bytes());
    }
    buf[name_off..name_off + name_bytes.len()].copy_from_slice(&name_bytes);
    buf[pairs_off..pairs_off + pairs.len()].copy_from_slice(&pairs);
    buf
}

/// `$STANDARD_INFORMATION` value bytes.
pub fn std_info_value(created: u64, written: u64, accessed: u64, attributes: u32) -> Vec<u8> {
    let mut value = vec![0u8; 48];
    value[0..8].copy_from_slice(&created.to_le_bytes());
    value[8..16].copy_from_slice(&written.to_le_bytes());
    value[24..32].copy_from_slice(&accessed.to_le_bytes());
    value[32..36].copy_from_slice(&attributes.to_le_bytes());
    value
}

/// `$FILE_NAME` value bytes.
pub fn file_name_value(parent_frs: u64, name: &str, namespace: u8) -> Vec<u8> {
    let name_bytes = encode_utf16le(name);
    let mut value = vec![0u8; 66 + name_bytes.len()];
    value[0..8].copy_from_slice(&parent_frs.to_le_bytes());
    value[64] = (name_bytes.len() / 2) as u8;
    value[65] = namespace;
    value[66..].copy_from_slice(&name_bytes);
    value
}

// ── Record and image building ───────────────────────────────────────────────

pub struct RecordSpec {
    directory: bool,
    in_use: bool,
    /// When false the bitmap bit stays clear (orphan record).
    in_bitmap: bool,
    attrs: Vec<Vec<u8>>,
}

impl Default for RecordSpec {
    fn default() -> Self {
        Self {
            directory: false,
            in_use: true,
            in_bitmap: true,
            attrs: Vec::new(),
        }
    }
}

impl RecordSpec {
    pub fn directory(&mut self) -> &mut Self {
        self.directory = true;
        self
    }

    pub fn orphan(&mut self) -> &mut Self {
        self.in_bitmap = false;
        self
    }

    pub fn not_in_use(&mut self) -> &mut Self {
        self.in_use = false;
        self
    }

    pub fn std_info(&mut self, attributes: u32) -> &mut Self {
        self.std_info_times(0, 0, 0, attributes)
    }

    pub fn std_info_times(
        &mut self,
        created: u64,
        written: u64,
        accessed: u64,
        attributes: u32,
    ) -> &mut Self {
        self.attrs.push(resident_attr(
            ntfs::ATTR_STANDARD_INFORMATION,
            "",
            &std_info_value(created, written, accessed, attributes),
            0,
        ));
        self
    }

    pub fn file_name(&mut self, parent_frs: u64, name: &str) -> &mut Self {
        self.file_name_ns(parent_frs, name, 0x01)
    }

    pub fn file_name_ns(&mut self, parent_frs: u64, name: &str, namespace: u8) -> &mut Self {
        self.attrs.push(resident_attr(
            ntfs::ATTR_FILE_NAME,
            "",
            &file_name_value(parent_frs, name, namespace),
            0,
        ));
        self
    }

    /// A resident `$DATA` stream of `len` zero bytes.
    pub fn resident_data(&mut self, name: &str, len: usize) -> &mut Self {
        self.attrs
            .push(resident_attr(ntfs::ATTR_DATA, name, &vec![0u8; len], 0));
        self
    }

    /// A non-resident `$DATA` stream with explicit sizes and no real
    /// clusters behind it.
    pub fn nonresident_data(&mut self, name: &str, sizes: NonResidentSizes) -> &mut Self {
        let clusters = (sizes.allocated.div_ceil(CLUSTER_SIZE as u64)).max(1) as i64;
        self.attrs.push(nonresident_attr(
            ntfs::ATTR_DATA,
            name,
            sizes,
            &[(clusters, Some(0x10_000))],
            0,
            0,
        ));
        self
    }

    pub fn sparse_data(&mut self, name: &str, sizes: NonResidentSizes) -> &mut Self {
        let clusters = (sizes.data.div_ceil(CLUSTER_SIZE as u64)).max(1) as i64;
        self.attrs.push(nonresident_attr(
            ntfs::ATTR_DATA,
            name,
            sizes,
            &[(clusters, None)],
            0x8000,
            0,
        ));
        self
    }

    /// The `$I30` directory index (INDEX_ROOT, resident).
    pub fn dir_index(&mut self) -> &mut Self {
        self.directory = true;
        self.attrs
            .push(resident_attr(ntfs::ATTR_INDEX_ROOT, "$I30", &[0u8; 32], 0));
        self
    }

    /// An arbitrary extra attribute (already encoded).
    pub fn raw_attr(&mut self, attr: Vec<u8>) -> &mut Self {
        self.attrs.push(attr);
        self
    }
}

pub struct MftImageBuilder {
    capacity: u32,
    records: BTreeMap<u32, RecordSpec>,
    reserved_clusters: i64,
}

impl MftImageBuilder {
    /// `capacity` FRS slots; must fill whole clusters (a multiple of 4 with
    /// 4 KiB clusters and 1 KiB records).
    pub fn new(capacity: u32) -> Self {
        assert_eq!(
            (capacity as u64 * FRS_SIZE as u64) % CLUSTER_SIZE as u64,
            0,
            "capacity must fill whole clusters"
        );
        Self {
            capacity,
            records: BTreeMap::new(),
            reserved_clusters: 0,
        }
    }

    /// A builder pre-populated with the 16 system metafiles (FRS 0–15),
    /// all named under the root, each carrying one data stream.
    pub fn with_system_files(capacity: u32) -> Self {
        let mut builder = Self::new(capacity);
        let names = [
            "$MFT", "$MFTMirr", "$LogFile", "$Volume", "$AttrDef", ".", "$Bitmap", "$Boot",
            "$BadClus", "$Secure", "$UpCase", "$Extend", "$Reserved12", "$Reserved13",
            "$Reserved14", "$Reserved15",
        ];
        for (frs, name) in names.iter().enumerate() {
            let frs = frs as u32;
            let record = builder.record(frs);
            record.std_info(0).file_name(5, name);
            if frs == ntfs::FRS_ROOT {
                record.dir_index();
            } else {
                record.resident_data("", 64);
            }
        }
        builder
    }

    pub fn record(&mut self, frs: u32) -> &mut RecordSpec {
        assert!(frs < self.capacity, "FRS {frs} beyond capacity");
        self.records.entry(frs).or_default()
    }

    pub fn reserved_clusters(&mut self, clusters: i64) -> &mut Self {
        self.reserved_clusters = clusters;
        self
    }

    pub fn build(self) -> SyntheticVolume {
        let frs = FRS_SIZE as usize;
        let mft_bytes = self.capacity as usize * frs;
        let data_clusters = mft_bytes / CLUSTER_SIZE as usize;

        let bitmap_bytes = (self.capacity as usize).div_ceil(8);
        let bitmap_clusters = bitmap_bytes.div_ceil(CLUSTER_SIZE as usize).max(1);

        let image_clusters = MFT_LCN as usize + data_clusters;
        let mut image = vec![0u8; image_clusters * CLUSTER_SIZE as usize];

        // Bitmap clusters.
        let mut bitmap = vec![0u8; bitmap_clusters * CLUSTER_SIZE as usize];
        for (&frs_no, spec) in &self.records {
            if spec.in_use && spec.in_bitmap {
                bitmap[(frs_no / 8) as usize] |= 1 << (frs_no % 8);
            }
        }
        let bitmap_off = BITMAP_LCN as usize * CLUSTER_SIZE as usize;
        image[bitmap_off..bitmap_off + bitmap.len()].copy_from_slice(&bitmap);

        // MFT records.
        let mft_off = MFT_LCN as usize * CLUSTER_SIZE as usize;
        for (&frs_no, spec) in &self.records {
            let rec = encode_record(spec);
            let off = mft_off + frs_no as usize * frs;
            image[off..off + frs].copy_from_slice(&rec);
        }

        SyntheticVolume {
            image,
            geometry: VolumeGeometry {
                bytes_per_cluster: CLUSTER_SIZE,
                bytes_per_frs: FRS_SIZE,
                mft_start_lcn: MFT_LCN,
                mft_valid_data_length: mft_bytes as u64,
                mft_zone_start: 0,
                mft_zone_end: 0,
                total_reserved_clusters: self.reserved_clusters,
            },
            data_extents: vec![Extent {
                next_vcn: data_clusters as u64,
                lcn: MFT_LCN,
            }],
            bitmap_extents: vec![Extent {
                next_vcn: bitmap_clusters as u64,
                lcn: BITMAP_LCN,
            }],
            priority: AtomicU8::new(2),
            reads: AtomicUsize::new(0),
            read_delay: None,
            fail_read_at: None,
            no_bitmap: false,
        }
    }
}

/// Lay out one 1 KiB FRS record with a valid multi-sector fixup.
fn encode_record(spec: &RecordSpec) -> Vec<u8> {
    let frs = FRS_SIZE as usize;
    let mut rec = vec![0u8; frs];
    rec[0..4].copy_from_slice(b"FILE");
    // Update sequence: offset 48, 1 + 2 sector entries.
    rec[4..6].copy_from_slice(&48u16.to_le_bytes());
    rec[6..8].copy_from_slice(&3u16.to_le_bytes());
    let first_attr = 56u16;
    rec[20..22].copy_from_slice(&first_attr.to_le_bytes());
    let mut flags = 0u16;
    if spec.in_use {
        flags |= FRH_IN_USE;
    }
    if spec.directory {
        flags |= FRH_DIRECTORY;
    }
    rec[22..24].copy_from_slice(&flags.to_le_bytes());

    let mut off = first_attr as usize;
    for attr in &spec.attrs {
        assert!(
            off + attr.len() + 8 <= frs - 8,
            "attributes overflow the record"
        );
        rec[off..off + attr.len()].copy_from_slice(attr);
        off += attr.len();
    }
    rec[off..off + 4].copy_from_slice(&ntfs::ATTR_END.to_le_bytes());

    // Apply the fixup in reverse: stash the true trailer words in the
    // update sequence array and stamp the sequence number over them.
    let usn = [0x01u8, 0x00];
    rec[48..50].copy_from_slice(&usn);
    for sector in 0..2 {
        let trailer = (sector + 1) * 512 - 2;
        let saved = 50 + sector * 2;
        let (a, b) = (rec[trailer], rec[trailer + 1]);
        rec[saved] = a;
        rec[saved + 1] = b;
        rec[trailer..trailer + 2].copy_from_slice(&usn);
    }
    rec
}

// ── The in-memory device ────────────────────────────────────────────────────

pub struct SyntheticVolume {
    image: Vec<u8>,
    geometry: VolumeGeometry,
    data_extents: Vec<Extent>,
    bitmap_extents: Vec<Extent>,
    priority: AtomicU8,
    pub reads: AtomicUsize,
    /// Artificial latency per read, for cancellation tests.
    pub read_delay: Option<Duration>,
    /// Reads at this byte offset fail with a permission error.
    pub fail_read_at: Option<u64>,
    /// Pretend the volume has no readable `$MFT::$BITMAP`.
    pub no_bitmap: bool,
}

impl VolumeDevice for SyntheticVolume {
    fn geometry(&self) -> io::Result<VolumeGeometry> {
        Ok(self.geometry)
    }

    fn extents(&self, stream: MftStream) -> io::Result<Vec<Extent>> {
        match stream {
            MftStream::Data => Ok(self.data_extents.clone()),
            MftStream::Bitmap if self.no_bitmap => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "bitmap unavailable",
            )),
            MftStream::Bitmap => Ok(self.bitmap_extents.clone()),
        }
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        if self.fail_read_at == Some(offset) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "injected read failure",
            ));
        }
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.image.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of image",
            ));
        }
        buf.copy_from_slice(&self.image[start..end]);
        Ok(())
    }

    fn io_priority(&self) -> u8 {
        self.priority.load(Ordering::Relaxed)
    }

    fn set_io_priority(&self, priority: u8) {
        self.priority.store(priority, Ordering::Relaxed);
    }
}

// ── Scan driving ────────────────────────────────────────────────────────────

use mftscout_core::scanner::{pool::IoPool, start_index};
use mftscout_core::{IndexOptions, NtfsIndex};

/// Scan a synthetic volume to completion and return the finished index.
pub fn scan(volume: SyntheticVolume) -> Arc<NtfsIndex> {
    scan_with_options(volume, IndexOptions::default())
}

pub fn scan_with_options(volume: SyntheticVolume, options: IndexOptions) -> Arc<NtfsIndex> {
    let pool = IoPool::new(Some(4));
    let index = NtfsIndex::new("T:\\", options);
    let handle = start_index(index.clone(), Arc::new(volume), pool.clone());
    handle.wait();
    assert!(
        index.is_finished(),
        "scan did not signal the finished event"
    );
    pool.shutdown();
    index
}
