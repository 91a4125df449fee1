//! Administrator rights detection and elevated relaunch.
//!
//! The library never elevates on its own. The binary captures a [`Privilege`]
//! once at startup and hands it to [`crate::Dism`], which refuses to run
//! admin-only operations with [`AppError::PermissionDenied`].

use serde::Serialize;
use tracing::info;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Administrator,
    Standard,
}

impl Privilege {
    /// Privilege level of the current process.
    pub fn current() -> Self {
        if is_user_admin() {
            Privilege::Administrator
        } else {
            Privilege::Standard
        }
    }

    pub fn is_admin(self) -> bool {
        self == Privilege::Administrator
    }

    pub fn require_admin(self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

#[cfg(windows)]
fn is_user_admin() -> bool {
    is_elevated::is_elevated()
}

// No UAC outside Windows.
#[cfg(not(windows))]
fn is_user_admin() -> bool {
    true
}

/// Start a new, elevated copy of the current executable with the same arguments.
///
/// Returns once the UAC prompt has been handed the request; the caller is
/// expected to exit afterwards.
#[cfg(windows)]
pub fn relaunch_elevated() -> Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::UI::Shell::ShellExecuteW;
    use windows_sys::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

    fn wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let exe = std::env::current_exe()?;
    let params = std::env::args().skip(1).map(quote_arg).collect::<Vec<_>>().join(" ");
    info!("relaunching {} elevated", exe.display());

    let verb = wide(OsStr::new("runas"));
    let file = wide(exe.as_os_str());
    let params = wide(OsStr::new(&params));
    let code = unsafe {
        ShellExecuteW(
            0,
            verb.as_ptr(),
            file.as_ptr(),
            params.as_ptr(),
            std::ptr::null(),
            SW_SHOWNORMAL,
        )
    };
    // Values above 32 mean success.
    if code as isize > 32 {
        Ok(())
    } else {
        Err(AppError::Message(format!(
            "Elevation request failed with code {}",
            code as isize
        )))
    }
}

#[cfg(not(windows))]
pub fn relaunch_elevated() -> Result<()> {
    info!("elevated relaunch requested on a platform without UAC");
    Err(AppError::Message(
        "Elevated relaunch is only supported on Windows".into(),
    ))
}

/// Quote one argument for a Windows command line.
#[cfg_attr(not(windows), allow(dead_code))]
fn quote_arg(arg: String) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg;
    }
    format!("\"{}\"", arg.replace('"', "\\\""))
}
