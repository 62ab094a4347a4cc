/// Platform access — the raw-volume device abstraction plus Windows-only
/// volume enumeration and permission checks.
pub mod volume;

#[cfg(windows)]
pub mod drives;
#[cfg(windows)]
pub mod permissions;

pub use volume::{
    Extent, MftStream, VolumeDevice, VolumeGeometry, IO_PRIORITY_BACKGROUND, IO_PRIORITY_FOREGROUND,
    IO_PRIORITY_NORMAL,
};

#[cfg(windows)]
pub use drives::{enumerate_volumes, VolumeInfo, VolumeKind};
#[cfg(windows)]
pub use permissions::{is_elevated, is_elevated_or_unknown};
#[cfg(windows)]
pub use volume::WindowsVolume;
