/// Volume discovery for multi-volume indexing.
///
/// Enumerates local mount points and reports which of them the raw MFT
/// reader can open — NTFS on a fixed or removable drive. Remote volumes
/// are dropped during enumeration; `\\.\X:` cannot be opened on them at
/// all.
use std::path::PathBuf;

use windows::core::PCWSTR;
use windows::Win32::Storage::FileSystem::{
    GetDiskFreeSpaceExW, GetDriveTypeW, GetLogicalDriveStringsW, GetVolumeInformationW,
};

use crate::model::size::format_size;

// GetDriveTypeW return values.
const DRIVE_REMOVABLE: u32 = 2;
const DRIVE_FIXED: u32 = 3;
const DRIVE_REMOTE: u32 = 4;
const DRIVE_CDROM: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    Fixed,
    Removable,
    Remote,
    Optical,
    Unknown,
}

impl VolumeKind {
    fn from_raw(raw: u32) -> Self {
        match raw {
            DRIVE_FIXED => Self::Fixed,
            DRIVE_REMOVABLE => Self::Removable,
            DRIVE_REMOTE => Self::Remote,
            DRIVE_CDROM => Self::Optical,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::Removable => "Removable",
            Self::Remote => "Remote",
            Self::Optical => "Optical",
            Self::Unknown => "Unknown",
        }
    }
}

/// One local mount point as the indexing host sees it.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    /// Mount point, e.g. `C:\` — what `NtfsIndex::new` takes as a root path.
    pub root: PathBuf,
    /// Drive letter with colon, e.g. `C:`.
    pub letter: String,
    pub kind: VolumeKind,
    /// Volume label; empty when the volume refused the query.
    pub label: String,
    /// Filesystem name, e.g. `NTFS`; empty when unknown.
    pub filesystem: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl VolumeInfo {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// True when the raw MFT reader can index this volume.
    pub fn is_indexable(&self) -> bool {
        self.filesystem == "NTFS"
            && matches!(self.kind, VolumeKind::Fixed | VolumeKind::Removable)
    }

    /// One-line description for logs and pickers.
    pub fn describe(&self) -> String {
        format!(
            "{} [{}] {} — {} used",
            self.letter,
            self.filesystem,
            self.kind.label(),
            format_size(self.used_bytes()),
        )
    }
}

/// Enumerate the local mount points.
pub fn enumerate_volumes() -> Vec<VolumeInfo> {
    // Null-separated, double-null-terminated list of root strings.
    let mut roots = [0u16; 512];
    let written = unsafe { GetLogicalDriveStringsW(Some(&mut roots)) } as usize;
    if written == 0 || written > roots.len() {
        tracing::warn!("logical drive enumeration failed");
        return Vec::new();
    }

    roots[..written]
        .split(|&unit| unit == 0)
        .filter(|chunk| !chunk.is_empty())
        .filter_map(probe_volume)
        .collect()
}

/// Query one mount point. Remote volumes yield `None`; a volume that
/// refuses the information queries is still listed, with empty strings and
/// zero sizes, so the host can show it as unreadable.
fn probe_volume(root_units: &[u16]) -> Option<VolumeInfo> {
    let root = String::from_utf16_lossy(root_units);
    let wide = wide_nul(&root);
    let name = PCWSTR(wide.as_ptr());

    let kind = VolumeKind::from_raw(unsafe { GetDriveTypeW(name) });
    if kind == VolumeKind::Remote {
        return None;
    }

    let mut label_units = [0u16; 64];
    let mut fs_units = [0u16; 64];
    let info_ok = unsafe {
        GetVolumeInformationW(
            name,
            Some(&mut label_units),
            None,
            None,
            None,
            Some(&mut fs_units),
        )
    }
    .is_ok();
    if !info_ok {
        tracing::debug!(%root, "volume information query failed");
    }

    let mut free: u64 = 0;
    let mut total: u64 = 0;
    let space_ok =
        unsafe { GetDiskFreeSpaceExW(name, Some(&mut free), Some(&mut total), None) }.is_ok();
    if !space_ok {
        free = 0;
        total = 0;
    }

    Some(VolumeInfo {
        letter: root.trim_end_matches('\\').to_string(),
        root: PathBuf::from(root),
        kind,
        label: if info_ok { utf16_field(&label_units) } else { String::new() },
        filesystem: if info_ok { utf16_field(&fs_units) } else { String::new() },
        total_bytes: total,
        free_bytes: free,
    })
}

fn wide_nul(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Decode a fixed UTF-16 output buffer up to its terminator.
fn utf16_field(units: &[u16]) -> String {
    let len = units.iter().position(|&c| c == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..len])
}
