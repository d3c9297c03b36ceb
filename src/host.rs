//! The machine the tool runs on, as a deployment target.

use std::process::Stdio;

use color_eyre::eyre::{self, Context};
use futures::{FutureExt, future::BoxFuture};
use smol::process::Command;
use tracing::debug;

use crate::{
    apple::is_app_bundle,
    device::{AnyDevice, ApplicationPackage, Device, DeviceError, Platform, StartOptions},
    discovery::{DiscoverySource, Snapshot},
    log_reader::{AnyLogReader, CommandLogReader, LogSource},
    toolchain::Toolchain,
    utils::{run_command, run_command_output},
};

/// The host platform, if applications can run on it.
#[must_use]
pub const fn host_platform() -> Option<Platform> {
    if cfg!(target_os = "macos") {
        Some(Platform::Mac)
    } else if cfg!(target_os = "linux") {
        Some(Platform::Linux)
    } else {
        None
    }
}

/// Yields the current machine when it runs macOS or Linux.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDiscovery;

impl HostDiscovery {
    /// Create a host discoverer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DiscoverySource for HostDiscovery {
    fn name(&self) -> &str {
        "host"
    }

    fn supports_platform(&self) -> bool {
        host_platform().is_some()
    }

    async fn current_devices(&self) -> eyre::Result<Snapshot> {
        let platform = host_platform().ok_or_else(|| eyre::eyre!("unsupported host"))?;
        Ok(vec![AnyDevice::new(HostDevice::new(platform))])
    }
}

/// The local machine.
#[derive(Debug, Clone)]
pub struct HostDevice {
    platform: Platform,
}

impl HostDevice {
    /// Create the host device for `platform`.
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn check_artifact(package: &ApplicationPackage) -> Result<(), DeviceError> {
        if package.path().exists() {
            Ok(())
        } else {
            Err(DeviceError::InvalidPackage(format!(
                "{} does not exist",
                package.path().display()
            )))
        }
    }

    async fn launch(
        &self,
        package: &ApplicationPackage,
        options: &StartOptions,
    ) -> Result<(), DeviceError> {
        Self::check_artifact(package)?;
        let flags = options.launch_flags();

        if self.platform == Platform::Mac && is_app_bundle(package.path()) {
            let mut args = vec![
                "-n".to_string(),
                package.path().display().to_string(),
                "--args".to_string(),
            ];
            args.extend(flags);
            run_command("open", &args)
                .await
                .map_err(DeviceError::Launch)?;
        } else {
            let child = Command::new(package.path())
                .args(&flags)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .with_context(|| format!("failed to launch {}", package.path().display()))
                .map_err(DeviceError::Launch)?;
            debug!(pid = child.id(), "launched application on host");
        }
        Ok(())
    }

    async fn terminate(&self, package: &ApplicationPackage) -> Result<(), DeviceError> {
        let output = run_command_output("pkill", ["-x", package.name()])
            .await
            .map_err(DeviceError::Stop)?;
        // pkill exits with 1 when nothing matched, which is fine for a stop.
        match output.status.code() {
            Some(0 | 1) => Ok(()),
            _ => Err(DeviceError::Stop(eyre::eyre!(
                "pkill failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

impl Device for HostDevice {
    fn id(&self) -> &str {
        match self.platform {
            Platform::Mac => "macos",
            _ => "linux",
        }
    }

    fn name(&self) -> &str {
        match self.platform {
            Platform::Mac => "This Mac",
            _ => "This computer",
        }
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn install<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        // Host builds run in place.
        async move { Self::check_artifact(package) }.boxed()
    }

    fn is_app_installed<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<bool, DeviceError>> {
        async move { Ok(package.path().exists()) }.boxed()
    }

    fn create_log_reader(&self) -> AnyLogReader {
        let reader = match self.platform {
            Platform::Mac => CommandLogReader::new(
                self.name(),
                LogSource::Host,
                "log",
                [
                    "stream",
                    "--style",
                    "compact",
                    "--predicate",
                    "subsystem == \"dev.waterui\"",
                ],
            ),
            _ => CommandLogReader::new(
                self.name(),
                LogSource::Host,
                "journalctl",
                ["--follow", "--lines=0", "--output=short"],
            ),
        };
        AnyLogReader::new(reader)
    }

    fn start_app<'a>(
        &'a self,
        package: &'a ApplicationPackage,
        _toolchain: &'a Toolchain,
        options: &'a StartOptions,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.launch(package, options).boxed()
    }

    fn stop_app<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.terminate(package).boxed()
    }
}
