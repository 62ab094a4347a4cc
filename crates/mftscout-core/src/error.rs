/// Error types and scan finish codes.
///
/// Two error surfaces exist: queries return typed `IndexError`s, while the
/// scan pipeline never lets an error escape a worker — everything is
/// converted at the worker boundary into a numeric finish code stored on the
/// index and surfaced when the finished event fires.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("unsupported volume: {0}")]
    UnsupportedVolume(String),

    #[error("volume read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan cancelled")]
    Cancelled,

    #[error("invalid search pattern: {0}")]
    Pattern(String),

    #[error("malformed key: no matching (name, stream) pair on the record")]
    InvalidKey,

    #[error("index not yet populated")]
    NotPopulated,
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Scan finish codes, in Win32 error-code numbering so hosts can surface
/// them directly.
pub mod finish {
    /// Scan completed.
    pub const OK: u32 = 0;
    /// ERROR_READ_FAULT: fallback for I/O failures with no OS code.
    pub const READ_FAULT: u32 = 30;
    /// ERROR_CANCELLED: the scan was cancelled. Not an error; the partial
    /// index stays queryable.
    pub const CANCELLED: u32 = 1223;
    /// ERROR_UNRECOGNIZED_VOLUME: not NTFS, or an unsupported layout.
    pub const UNRECOGNIZED_VOLUME: u32 = 1785;

    /// True for codes that represent a real failure (cancellation is not).
    pub fn is_error(code: u32) -> bool {
        code != OK && code != CANCELLED
    }
}

/// Map an I/O error onto a finish code.
pub fn finish_code_for(err: &std::io::Error) -> u32 {
    match err.raw_os_error() {
        Some(code) if code > 0 => code as u32,
        _ => finish::READ_FAULT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_not_an_error() {
        assert!(!finish::is_error(finish::OK));
        assert!(!finish::is_error(finish::CANCELLED));
        assert!(finish::is_error(finish::UNRECOGNIZED_VOLUME));
        assert!(finish::is_error(finish::READ_FAULT));
    }

    #[test]
    fn io_errors_keep_their_os_code() {
        let err = std::io::Error::from_raw_os_error(5);
        assert_eq!(finish_code_for(&err), 5);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "synthetic");
        assert_eq!(finish_code_for(&err), finish::READ_FAULT);
    }
}
