/// Raw volume access.
///
/// The scan pipeline talks to the volume through the `VolumeDevice` trait:
/// NTFS geometry, the `$MFT` retrieval pointers, and aligned positional
/// reads. The Windows implementation opens `\\.\X:` directly; tests drive
/// the same pipeline with an in-memory device.
use std::io;

/// NTFS volume parameters needed to plan and parse an MFT scan.
#[derive(Clone, Copy, Debug)]
pub struct VolumeGeometry {
    pub bytes_per_cluster: u32,
    pub bytes_per_frs: u32,
    pub mft_start_lcn: i64,
    /// Valid bytes of `$MFT::$DATA`; capacity = this / bytes_per_frs.
    pub mft_valid_data_length: u64,
    pub mft_zone_start: i64,
    pub mft_zone_end: i64,
    /// Clusters the filesystem holds in reserve (counted as used space).
    pub total_reserved_clusters: i64,
}

impl VolumeGeometry {
    pub fn mft_capacity(&self) -> u32 {
        if self.bytes_per_frs == 0 {
            0
        } else {
            (self.mft_valid_data_length / self.bytes_per_frs as u64) as u32
        }
    }
}

/// One extent of an attribute's retrieval pointers: the extent covers VCNs
/// up to (exclusive) `next_vcn` and starts at `lcn` on the volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub next_vcn: u64,
    pub lcn: i64,
}

/// The two `$MFT` streams the scanner reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MftStream {
    Data,
    Bitmap,
}

/// Per-device I/O priority; pending reads for higher values are dispatched
/// first when several volumes are being indexed at once.
pub const IO_PRIORITY_BACKGROUND: u8 = 0;
pub const IO_PRIORITY_NORMAL: u8 = 2;
pub const IO_PRIORITY_FOREGROUND: u8 = 4;

pub trait VolumeDevice: Send + Sync {
    fn geometry(&self) -> io::Result<VolumeGeometry>;

    /// Retrieval pointers of `$MFT::$DATA` or `$MFT::$BITMAP`.
    fn extents(&self, stream: MftStream) -> io::Result<Vec<Extent>>;

    /// Read exactly `buf.len()` bytes at a cluster-aligned byte offset.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn io_priority(&self) -> u8 {
        IO_PRIORITY_NORMAL
    }

    fn set_io_priority(&self, _priority: u8) {}
}

#[cfg(windows)]
pub use windows_impl::WindowsVolume;

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::fs::File;
    use std::os::windows::fs::FileExt;
    use std::os::windows::io::FromRawHandle;
    use std::sync::atomic::{AtomicU8, Ordering};
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::GetLastError;
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, GetVolumeInformationW, FILE_ATTRIBUTE_NORMAL, FILE_GENERIC_READ,
        FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
    };
    use windows::Win32::System::Ioctl::{
        FSCTL_GET_NTFS_VOLUME_DATA, FSCTL_GET_RETRIEVAL_POINTERS, NTFS_VOLUME_DATA_BUFFER,
    };
    use windows::Win32::System::IO::DeviceIoControl;

    const ERROR_MORE_DATA: u32 = 234;
    const ERROR_HANDLE_EOF: u32 = 38;

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// A raw NTFS volume opened for direct MFT reads.
    pub struct WindowsVolume {
        /// `\\.\X:` device handle, wrapped for positional reads.
        file: File,
        /// Root path as given, e.g. `C:\`, used to open `$MFT` streams.
        root: String,
        geometry: VolumeGeometry,
        priority: AtomicU8,
    }

    impl WindowsVolume {
        /// Open the volume containing `root_path` (e.g. `C:\`).
        ///
        /// Fails with `Unsupported` when the filesystem is not NTFS, so the
        /// caller can surface "unsupported volume" before any I/O starts.
        pub fn open(root_path: &str) -> io::Result<Self> {
            let root = normalize_root(root_path);
            if !is_ntfs(&root) {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("{root} is not an NTFS volume"),
                ));
            }

            let device = format!("\\\\.\\{}", root.trim_end_matches('\\'));
            let wide = to_wide(&device);
            let handle = unsafe {
                CreateFileW(
                    PCWSTR(wide.as_ptr()),
                    FILE_GENERIC_READ.0,
                    FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                    None,
                    OPEN_EXISTING,
                    FILE_ATTRIBUTE_NORMAL,
                    None,
                )
            }
            .map_err(|e| io::Error::from_raw_os_error(e.code().0 & 0xFFFF))?;

            let file = unsafe { File::from_raw_handle(handle.0 as _) };
            let geometry = query_geometry(&file)?;
            tracing::info!(
                volume = %root,
                cluster_size = geometry.bytes_per_cluster,
                frs_size = geometry.bytes_per_frs,
                mft_capacity = geometry.mft_capacity(),
                "opened raw NTFS volume"
            );
            Ok(Self {
                file,
                root,
                geometry,
                priority: AtomicU8::new(IO_PRIORITY_NORMAL),
            })
        }
    }

    impl VolumeDevice for WindowsVolume {
        fn geometry(&self) -> io::Result<VolumeGeometry> {
            Ok(self.geometry)
        }

        fn extents(&self, stream: MftStream) -> io::Result<Vec<Extent>> {
            let name = match stream {
                MftStream::Data => "$MFT::$DATA",
                MftStream::Bitmap => "$MFT::$BITMAP",
            };
            match retrieval_pointers(&format!("{}{name}", self.root)) {
                Ok(extents) => Ok(extents),
                Err(err) if stream == MftStream::Data => {
                    // The MFT itself is always openable as a fallback single
                    // extent: valid-data clusters starting at MftStartLcn.
                    tracing::warn!(%err, "retrieval pointers unavailable; synthesizing $MFT extent");
                    let clusters = self
                        .geometry
                        .mft_valid_data_length
                        .div_ceil(self.geometry.bytes_per_cluster as u64);
                    Ok(vec![Extent {
                        next_vcn: clusters,
                        lcn: self.geometry.mft_start_lcn,
                    }])
                }
                Err(err) => Err(err),
            }
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
            let mut done = 0;
            while done < buf.len() {
                let n = self.file.seek_read(&mut buf[done..], offset + done as u64)?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "volume read returned no data",
                    ));
                }
                done += n;
            }
            Ok(())
        }

        fn io_priority(&self) -> u8 {
            self.priority.load(Ordering::Relaxed)
        }

        fn set_io_priority(&self, priority: u8) {
            self.priority.store(priority, Ordering::Relaxed);
        }
    }

    fn normalize_root(root_path: &str) -> String {
        let trimmed = root_path.trim_end_matches(['\\', '/']);
        format!("{trimmed}\\")
    }

    fn is_ntfs(root: &str) -> bool {
        let wide = to_wide(root);
        let mut fs_buf = [0u16; 64];
        let ok = unsafe {
            GetVolumeInformationW(PCWSTR(wide.as_ptr()), None, None, None, None, Some(&mut fs_buf))
                .is_ok()
        };
        if !ok {
            return false;
        }
        let len = fs_buf.iter().position(|&c| c == 0).unwrap_or(0);
        String::from_utf16_lossy(&fs_buf[..len]) == "NTFS"
    }

    fn query_geometry(file: &File) -> io::Result<VolumeGeometry> {
        use std::os::windows::io::AsRawHandle;
        let mut data: NTFS_VOLUME_DATA_BUFFER = unsafe { std::mem::zeroed() };
        let mut returned = 0u32;
        unsafe {
            DeviceIoControl(
                windows::Win32::Foundation::HANDLE(file.as_raw_handle() as _),
                FSCTL_GET_NTFS_VOLUME_DATA,
                None,
                0,
                Some(&mut data as *mut _ as *mut _),
                std::mem::size_of::<NTFS_VOLUME_DATA_BUFFER>() as u32,
                Some(&mut returned),
                None,
            )
        }
        .map_err(|e| io::Error::from_raw_os_error(e.code().0 & 0xFFFF))?;

        Ok(VolumeGeometry {
            bytes_per_cluster: data.BytesPerCluster,
            bytes_per_frs: data.BytesPerFileRecordSegment,
            mft_start_lcn: data.MftStartLcn,
            mft_valid_data_length: data.MftValidDataLength.max(0) as u64,
            mft_zone_start: data.MftZoneStart,
            mft_zone_end: data.MftZoneEnd,
            total_reserved_clusters: data.TotalReserved,
        })
    }

    /// FSCTL_GET_RETRIEVAL_POINTERS over a named stream, following
    /// ERROR_MORE_DATA continuations.
    fn retrieval_pointers(path: &str) -> io::Result<Vec<Extent>> {
        let wide = to_wide(path);
        let handle = unsafe {
            CreateFileW(
                PCWSTR(wide.as_ptr()),
                0, // attributes-only open; FSCTLs still work
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                None,
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                None,
            )
        }
        .map_err(|e| io::Error::from_raw_os_error(e.code().0 & 0xFFFF))?;
        let file = unsafe { File::from_raw_handle(handle.0 as _) };

        use std::os::windows::io::AsRawHandle;
        let raw = windows::Win32::Foundation::HANDLE(file.as_raw_handle() as _);

        let mut extents = Vec::new();
        let mut starting_vcn = 0i64;
        // 16-byte header (ExtentCount + StartingVcn) then 16-byte extents.
        let mut buf = vec![0u8; 16 + 512 * 16];
        loop {
            let mut returned = 0u32;
            let result = unsafe {
                DeviceIoControl(
                    raw,
                    FSCTL_GET_RETRIEVAL_POINTERS,
                    Some(&starting_vcn as *const _ as *const _),
                    std::mem::size_of::<i64>() as u32,
                    Some(buf.as_mut_ptr() as *mut _),
                    buf.len() as u32,
                    Some(&mut returned),
                    None,
                )
            };
            let more = match result {
                Ok(()) => false,
                Err(_) => {
                    let code = unsafe { GetLastError().0 };
                    match code {
                        ERROR_MORE_DATA => true,
                        ERROR_HANDLE_EOF => break,
                        _ => return Err(io::Error::from_raw_os_error(code as i32)),
                    }
                }
            };

            let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
            for i in 0..count {
                let off = 16 + i * 16;
                let next_vcn = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
                let lcn = i64::from_le_bytes(buf[off + 8..off + 16].try_into().unwrap());
                extents.push(Extent {
                    next_vcn: next_vcn.max(0) as u64,
                    lcn,
                });
                starting_vcn = next_vcn;
            }
            if !more {
                break;
            }
        }
        Ok(extents)
    }
}
