//! Apple platform support.

use std::path::Path;

use crate::toolchain::Toolchain;

/// Physical iOS devices, listed with `xcdevice` and driven with `devicectl`.
pub mod device;
/// iOS simulators managed by `simctl`.
pub mod simulator;

/// Apple tooling only exists on macOS hosts.
pub(crate) fn host_supports(toolchain: &Toolchain) -> bool {
    cfg!(target_os = "macos") && toolchain.xcrun().is_some()
}

/// Apple bundles are directories ending in `.app`.
pub(crate) fn is_app_bundle(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "app")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_app_bundles() {
        assert!(is_app_bundle(Path::new("build/Demo.app")));
        assert!(!is_app_bundle(Path::new("build/demo.apk")));
        assert!(!is_app_bundle(Path::new("build/demo")));
    }

    #[test]
    fn requires_xcrun() {
        assert!(!host_supports(&Toolchain::default()));
    }
}
