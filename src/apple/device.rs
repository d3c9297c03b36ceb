use std::{ffi::OsStr, path::PathBuf, sync::Arc};

use color_eyre::eyre::{self, Context};
use futures::{FutureExt, future::BoxFuture};
use serde::Deserialize;
use tracing::debug;

use crate::{
    apple::{host_supports, is_app_bundle},
    device::{AnyDevice, ApplicationPackage, Device, DeviceError, Platform, StartOptions},
    discovery::{DiscoverySource, Snapshot},
    log_reader::{AnyLogReader, CommandLogReader, LogSource},
    toolchain::Toolchain,
    utils::run_command,
};

const IPHONE_PLATFORM: &str = "com.apple.platform.iphoneos";

#[derive(Debug, Deserialize)]
struct XcdeviceError {
    description: Option<String>,
    #[serde(rename = "recoverySuggestion")]
    recovery_suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XcdeviceEntry {
    name: Option<String>,
    identifier: Option<String>,
    platform: Option<String>,
    simulator: Option<bool>,
    available: Option<bool>,
    #[serde(rename = "operatingSystemVersion")]
    operating_system_version: Option<String>,
    error: Option<XcdeviceError>,
}

/// A physical iOS device as listed by `xcrun xcdevice list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IosDeviceRecord {
    /// Device UDID.
    pub udid: String,
    /// User-assigned device name.
    pub name: String,
    /// OS version, e.g. `17.2 (21C62)`.
    pub os_version: Option<String>,
    /// Whether Xcode can deploy to the device right now.
    pub available: bool,
    /// Why the device is unavailable, as reported by Xcode.
    pub error: Option<String>,
}

/// Parse `xcdevice list` output, keeping physical iOS devices only.
///
/// # Errors
/// Returns an error if the output is not the expected JSON.
pub fn parse_xcdevice_list(json: &str) -> eyre::Result<Vec<IosDeviceRecord>> {
    let entries: Vec<XcdeviceEntry> =
        serde_json::from_str(json).context("failed to parse `xcdevice list` output")?;

    Ok(entries
        .into_iter()
        .filter(|entry| {
            entry.simulator != Some(true) && entry.platform.as_deref() == Some(IPHONE_PLATFORM)
        })
        .filter_map(|entry| {
            let udid = entry.identifier?;
            let error = entry.error.and_then(|error| {
                match (error.description, error.recovery_suggestion) {
                    (Some(description), Some(suggestion)) => {
                        Some(format!("{description} {suggestion}"))
                    }
                    (description, suggestion) => description.or(suggestion),
                }
            });
            Some(IosDeviceRecord {
                name: entry.name.unwrap_or_else(|| udid.clone()),
                udid,
                os_version: entry.operating_system_version,
                available: entry.available.unwrap_or(false),
                error,
            })
        })
        .collect())
}

/// Whether `devicectl device info apps` output lists `bundle_id` as a whole column value.
fn lists_bundle_id(output: &str, bundle_id: &str) -> bool {
    output
        .lines()
        .any(|line| line.split_whitespace().any(|token| token == bundle_id))
}

/// Discovers physical iOS devices attached over USB or the network.
#[derive(Debug, Clone)]
pub struct IosDeviceDiscovery {
    toolchain: Arc<Toolchain>,
}

impl IosDeviceDiscovery {
    /// Create a discoverer using the toolchain's `xcrun`.
    #[must_use]
    pub const fn new(toolchain: Arc<Toolchain>) -> Self {
        Self { toolchain }
    }
}

impl DiscoverySource for IosDeviceDiscovery {
    fn name(&self) -> &str {
        "ios"
    }

    fn supports_platform(&self) -> bool {
        host_supports(&self.toolchain)
    }

    async fn current_devices(&self) -> eyre::Result<Snapshot> {
        let xcrun = self.toolchain.require_xcrun()?;
        let output = run_command(xcrun, ["xcdevice", "list", "--timeout=1"]).await?;

        Ok(parse_xcdevice_list(&output)?
            .into_iter()
            .map(|record| AnyDevice::new(IosDevice::new(xcrun.to_path_buf(), record)))
            .collect())
    }
}

/// A physical iOS device.
#[derive(Debug, Clone)]
pub struct IosDevice {
    xcrun: PathBuf,
    record: IosDeviceRecord,
}

impl IosDevice {
    /// Wrap a parsed device record.
    #[must_use]
    pub const fn new(xcrun: PathBuf, record: IosDeviceRecord) -> Self {
        Self { xcrun, record }
    }

    async fn devicectl<I, A>(&self, args: I) -> eyre::Result<String>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let mut full = vec![OsStr::new("devicectl").to_os_string()];
        full.extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        run_command(&self.xcrun, full).await
    }

    async fn install_bundle(&self, package: &ApplicationPackage) -> Result<(), DeviceError> {
        if !is_app_bundle(package.path()) {
            return Err(DeviceError::InvalidPackage(format!(
                "{} is not an .app bundle",
                package.path().display()
            )));
        }

        self.devicectl([
            OsStr::new("device"),
            OsStr::new("install"),
            OsStr::new("app"),
            OsStr::new("--device"),
            OsStr::new(&self.record.udid),
            package.path().as_os_str(),
        ])
        .await
        .map_err(DeviceError::Install)?;
        Ok(())
    }

    async fn bundle_installed(&self, package: &ApplicationPackage) -> Result<bool, DeviceError> {
        let output = self
            .devicectl([
                "device",
                "info",
                "apps",
                "--device",
                self.record.udid.as_str(),
                "--bundle-id",
                package.id(),
            ])
            .await
            .map_err(DeviceError::Query)?;
        Ok(lists_bundle_id(&output, package.id()))
    }

    async fn launch(
        &self,
        package: &ApplicationPackage,
        options: &StartOptions,
    ) -> Result<(), DeviceError> {
        if options.clear_logs {
            debug!(udid = %self.record.udid, "device syslog cannot be cleared");
        }

        let mut args = vec![
            "device".to_string(),
            "process".to_string(),
            "launch".to_string(),
            "--terminate-existing".to_string(),
            "--device".to_string(),
            self.record.udid.clone(),
            package.id().to_string(),
        ];
        args.extend(options.launch_flags());

        self.devicectl(&args)
            .await
            .map_err(DeviceError::Launch)?;
        debug!(udid = %self.record.udid, package = package.id(), "launched application");
        Ok(())
    }
}

impl Device for IosDevice {
    fn id(&self) -> &str {
        &self.record.udid
    }

    fn name(&self) -> &str {
        &self.record.name
    }

    fn platform(&self) -> Platform {
        Platform::Ios
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn is_supported(&self) -> bool {
        self.record.available && self.record.error.is_none()
    }

    fn support_message(&self) -> String {
        match (&self.record.error, &self.record.os_version) {
            (Some(error), _) => format!("Unsupported: {error}"),
            (None, _) if !self.record.available => "Unsupported: device is not ready".to_string(),
            (None, Some(version)) => format!("Supported (iOS {version})"),
            (None, None) => "Supported".to_string(),
        }
    }

    fn install<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.install_bundle(package).boxed()
    }

    fn is_app_installed<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<bool, DeviceError>> {
        self.bundle_installed(package).boxed()
    }

    fn create_log_reader(&self) -> AnyLogReader {
        AnyLogReader::new(CommandLogReader::new(
            self.record.name.clone(),
            LogSource::DeviceSyslog {
                udid: self.record.udid.clone(),
            },
            "idevicesyslog",
            ["-u".to_string(), self.record.udid.clone()],
        ))
    }

    fn start_app<'a>(
        &'a self,
        package: &'a ApplicationPackage,
        _toolchain: &'a Toolchain,
        options: &'a StartOptions,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.launch(package, options).boxed()
    }

    // `devicectl` terminates by pid only, and launches are not tracked.
    fn stop_app<'a>(
        &'a self,
        _package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        async {
            Err(DeviceError::Unsupported {
                operation: "stop_app",
                platform: Platform::Ios,
            })
        }
        .boxed()
    }
}
