/// Elevation check.
///
/// Raw reads on `\\.\X:` need administrator rights. Hosts probe this before
/// starting a scan so a missing privilege surfaces as one clear message up
/// front instead of an access-denied from deep inside the volume open.
use std::io;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

use crate::error::{IndexError, Result};

/// Whether the current process token is elevated.
///
/// Token-query failures are returned as errors rather than read as "not
/// elevated": a process that cannot inspect its own token (restricted
/// tokens, hardened hosts) is a different situation from a plain
/// unelevated one, and the caller's error message should say so.
pub fn is_elevated() -> Result<bool> {
    let mut token = HANDLE::default();
    unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) }
        .map_err(|e| token_error("OpenProcessToken", e))?;

    let mut elevation = TOKEN_ELEVATION::default();
    let mut returned = 0u32;
    let queried = unsafe {
        GetTokenInformation(
            token,
            TokenElevation,
            Some(&mut elevation as *mut TOKEN_ELEVATION as *mut _),
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        )
    };
    unsafe {
        let _ = CloseHandle(token);
    }
    queried.map_err(|e| token_error("GetTokenInformation", e))?;

    Ok(elevation.TokenIsElevated != 0)
}

/// The yes/no form used by availability probes, where a query failure just
/// means the MFT reader is not available here.
pub fn is_elevated_or_unknown() -> bool {
    match is_elevated() {
        Ok(elevated) => elevated,
        Err(err) => {
            tracing::debug!(%err, "elevation query failed; treating as not elevated");
            false
        }
    }
}

fn token_error(what: &str, err: windows::core::Error) -> IndexError {
    tracing::debug!(%what, code = err.code().0, "process token query failed");
    IndexError::Io(io::Error::from_raw_os_error(err.code().0 & 0xFFFF))
}
