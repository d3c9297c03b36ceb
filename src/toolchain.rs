//! Locating the external tools devices are driven through.

use std::{
    env,
    path::{Path, PathBuf},
};

use tracing::debug;
use which::which;

use crate::device::DeviceError;

/// Paths to the command-line tools used to talk to devices.
///
/// A missing tool is not an error until an operation needs it; discoverers whose tool is
/// absent simply report themselves as unsupported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolchain {
    adb: Option<PathBuf>,
    xcrun: Option<PathBuf>,
}

impl Toolchain {
    /// Create a toolchain from explicit paths.
    #[must_use]
    pub const fn new(adb: Option<PathBuf>, xcrun: Option<PathBuf>) -> Self {
        Self { adb, xcrun }
    }

    /// Look the tools up on `PATH` and in the usual Android SDK locations.
    #[must_use]
    pub fn detect() -> Self {
        let toolchain = Self {
            adb: find_android_tool("adb"),
            xcrun: if cfg!(target_os = "macos") {
                which("xcrun").ok()
            } else {
                None
            },
        };
        debug!(adb = ?toolchain.adb, xcrun = ?toolchain.xcrun, "detected toolchain");
        toolchain
    }

    /// Path to `adb`, if found.
    #[must_use]
    pub fn adb(&self) -> Option<&Path> {
        self.adb.as_deref()
    }

    /// Path to `xcrun`, if found.
    #[must_use]
    pub fn xcrun(&self) -> Option<&Path> {
        self.xcrun.as_deref()
    }

    /// Path to `adb`.
    ///
    /// # Errors
    /// Returns [`DeviceError::ToolNotFound`] if `adb` is missing.
    pub fn require_adb(&self) -> Result<&Path, DeviceError> {
        self.adb().ok_or(DeviceError::ToolNotFound("adb"))
    }

    /// Path to `xcrun`.
    ///
    /// # Errors
    /// Returns [`DeviceError::ToolNotFound`] if `xcrun` is missing.
    pub fn require_xcrun(&self) -> Result<&Path, DeviceError> {
        self.xcrun().ok_or(DeviceError::ToolNotFound("xcrun"))
    }
}

/// Find an Android SDK tool on `PATH` or inside a known SDK root.
#[must_use]
pub fn find_android_tool(tool: &str) -> Option<PathBuf> {
    if let Ok(path) = which(tool) {
        return Some(path);
    }

    let suffixes: &[&str] = match tool {
        "adb" => &["platform-tools/adb", "platform-tools/adb.exe"],
        "emulator" => &["emulator/emulator", "emulator/emulator.exe"],
        _ => &[],
    };

    android_sdk_roots()
        .into_iter()
        .flat_map(|root| suffixes.iter().map(move |suffix| root.join(suffix)))
        .find(|candidate| candidate.exists())
}

/// Existing Android SDK roots, most specific first.
#[must_use]
pub fn android_sdk_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
        if let Some(path) = env::var_os(var) {
            roots.push(PathBuf::from(path));
        }
    }
    if let Some(home) = env::var_os("HOME") {
        let home = PathBuf::from(home);
        roots.push(home.join("Library/Android/sdk"));
        roots.push(home.join("Android/Sdk"));
    }
    roots.into_iter().filter(|root| root.exists()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tools_surface_as_errors() {
        let toolchain = Toolchain::default();
        assert!(matches!(
            toolchain.require_adb(),
            Err(DeviceError::ToolNotFound("adb"))
        ));
        assert!(matches!(
            toolchain.require_xcrun(),
            Err(DeviceError::ToolNotFound("xcrun"))
        ));
    }

    #[test]
    fn explicit_paths_are_returned() {
        let toolchain = Toolchain::new(Some(PathBuf::from("/opt/sdk/platform-tools/adb")), None);
        assert_eq!(
            toolchain.require_adb().unwrap(),
            Path::new("/opt/sdk/platform-tools/adb")
        );
        assert!(toolchain.xcrun().is_none());
    }

    #[test]
    fn unknown_tools_are_not_found() {
        assert!(find_android_tool("definitely-not-an-android-tool").is_none());
    }
}
