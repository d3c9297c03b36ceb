use std::{collections::HashMap, ffi::OsStr, path::PathBuf, sync::Arc};

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
    utils::{run_command, run_command_output},
};

const IOS_RUNTIME_PREFIX: &str = "com.apple.CoreSimulator.SimRuntime.iOS-";

/// A simulator as listed by `xcrun simctl list devices --json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulatorRecord {
    /// Unique device identifier.
    ///
    /// Note: not `uuid` but `udid`!
    pub udid: String,
    /// Name of the simulator, e.g. `iPhone 15`.
    pub name: String,
    /// Current state (`Booted`, `Shutdown`...).
    pub state: String,
    /// Whether the runtime backing the simulator is installed.
    #[serde(rename = "isAvailable", default)]
    pub is_available: bool,
    /// Device type identifier.
    #[serde(rename = "deviceTypeIdentifier", default)]
    pub device_type_identifier: String,
    /// OS version from the runtime key, e.g. `17.2`.
    #[serde(skip)]
    pub os_version: String,
}

impl SimulatorRecord {
    /// Whether the simulator is running.
    #[must_use]
    pub fn is_booted(&self) -> bool {
        self.state == "Booted"
    }
}

/// Parse `simctl list devices --json`, keeping iOS runtimes only.
///
/// Records are sorted by name, then udid.
///
/// # Errors
/// Returns an error if the output is not the expected JSON.
pub fn parse_simctl_devices(json: &str) -> eyre::Result<Vec<SimulatorRecord>> {
    #[derive(Deserialize)]
    struct Root {
        devices: HashMap<String, Vec<SimulatorRecord>>,
    }

    let root: Root =
        serde_json::from_str(json).context("failed to parse `simctl list devices` output")?;

    let mut records: Vec<SimulatorRecord> = root
        .devices
        .into_iter()
        .filter_map(|(runtime, records)| {
            let version = runtime.strip_prefix(IOS_RUNTIME_PREFIX)?.replace('-', ".");
            Some(records.into_iter().map(move |mut record| {
                record.os_version.clone_from(&version);
                record
            }))
        })
        .flatten()
        .collect();

    records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.udid.cmp(&b.udid)));
    Ok(records)
}

/// Extract the process id from `simctl launch` output such as `com.example.app: 12345`.
fn parse_simctl_launch_pid(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| {
            let pid = line.rsplit_once(':').map_or(line, |(_, pid)| pid);
            pid.trim().parse().ok()
        })
}

/// Discovers booted iOS simulators.
#[derive(Debug, Clone)]
pub struct IosSimulatorDiscovery {
    toolchain: Arc<Toolchain>,
}

impl IosSimulatorDiscovery {
    /// Create a discoverer using the toolchain's `xcrun`.
    #[must_use]
    pub const fn new(toolchain: Arc<Toolchain>) -> Self {
        Self { toolchain }
    }
}

impl DiscoverySource for IosSimulatorDiscovery {
    fn name(&self) -> &str {
        "ios-simulator"
    }

    fn supports_platform(&self) -> bool {
        host_supports(&self.toolchain)
    }

    async fn current_devices(&self) -> eyre::Result<Snapshot> {
        let xcrun = self.toolchain.require_xcrun()?;
        let output = run_command(xcrun, ["simctl", "list", "devices", "--json"]).await?;

        Ok(parse_simctl_devices(&output)?
            .into_iter()
            .filter(|record| record.is_available && record.is_booted())
            .map(|record| AnyDevice::new(IosSimulator::new(xcrun.to_path_buf(), record)))
            .collect())
    }
}

/// A booted iOS simulator.
#[derive(Debug, Clone)]
pub struct IosSimulator {
    xcrun: PathBuf,
    record: SimulatorRecord,
}

impl IosSimulator {
    /// Wrap a parsed simulator record.
    #[must_use]
    pub const fn new(xcrun: PathBuf, record: SimulatorRecord) -> Self {
        Self { xcrun, record }
    }

    /// The record this simulator was discovered from.
    #[must_use]
    pub const fn record(&self) -> &SimulatorRecord {
        &self.record
    }

    async fn install_bundle(&self, package: &ApplicationPackage) -> Result<(), DeviceError> {
        if !is_app_bundle(package.path()) {
            return Err(DeviceError::InvalidPackage(format!(
                "{} is not an .app bundle",
                package.path().display()
            )));
        }

        let path = package.path().as_os_str();
        run_command(
            &self.xcrun,
            [
                OsStr::new("simctl"),
                OsStr::new("install"),
                OsStr::new(&self.record.udid),
                path,
            ],
        )
        .await
        .map_err(DeviceError::Install)?;
        Ok(())
    }

    async fn bundle_installed(&self, package: &ApplicationPackage) -> Result<bool, DeviceError> {
        let output = run_command_output(
            &self.xcrun,
            [
                "simctl",
                "get_app_container",
                self.record.udid.as_str(),
                package.id(),
            ],
        )
        .await
        .map_err(DeviceError::Query)?;
        Ok(output.status.success())
    }

    async fn launch(
        &self,
        package: &ApplicationPackage,
        options: &StartOptions,
    ) -> Result<(), DeviceError> {
        if options.clear_logs {
            debug!(udid = %self.record.udid, "simulator logs cannot be cleared");
        }

        let mut args = vec![
            "simctl".to_string(),
            "launch".to_string(),
            "--terminate-running-process".to_string(),
            self.record.udid.clone(),
            package.id().to_string(),
        ];
        args.extend(options.launch_flags());

        let stdout = run_command(&self.xcrun, &args)
            .await
            .map_err(DeviceError::Launch)?;
        let pid = parse_simctl_launch_pid(&stdout).ok_or_else(|| {
            DeviceError::Launch(eyre::eyre!(
                "Failed to parse PID from simctl launch output: {}",
                stdout.trim()
            ))
        })?;

        debug!(udid = %self.record.udid, pid, "launched application on simulator");
        Ok(())
    }

    async fn terminate(&self, package: &ApplicationPackage) -> Result<(), DeviceError> {
        run_command(
            &self.xcrun,
            ["simctl", "terminate", self.record.udid.as_str(), package.id()],
        )
        .await
        .map_err(DeviceError::Stop)?;
        Ok(())
    }
}

impl Device for IosSimulator {
    fn id(&self) -> &str {
        &self.record.udid
    }

    fn name(&self) -> &str {
        &self.record.name
    }

    fn platform(&self) -> Platform {
        Platform::IosSimulator
    }

    fn is_connected(&self) -> bool {
        self.record.is_booted()
    }

    fn is_supported(&self) -> bool {
        self.record.is_available
    }

    fn support_message(&self) -> String {
        if self.record.is_available {
            format!("Supported (iOS {})", self.record.os_version)
        } else {
            "Unsupported: simulator runtime is not installed".to_string()
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

    /// Every booted simulator writes to the same system log, so all simulator readers share
    /// one source.
    fn create_log_reader(&self) -> AnyLogReader {
        AnyLogReader::new(CommandLogReader::new(
            "iOS Simulator",
            LogSource::SimulatorSystemLog,
            self.xcrun.clone(),
            [
                "simctl",
                "spawn",
                "booted",
                "log",
                "stream",
                "--style",
                "compact",
                "--predicate",
                "subsystem == \"dev.waterui\"",
            ],
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

    fn stop_app<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.terminate(package).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const SIMCTL_OUTPUT: &str = r#"{
      "devices": {
        "com.apple.CoreSimulator.SimRuntime.iOS-17-2": [
          {
            "udid": "B6A3C1E2-0000-4000-8000-000000000002",
            "name": "iPhone 15",
            "state": "Booted",
            "isAvailable": true,
            "deviceTypeIdentifier": "com.apple.CoreSimulator.SimDeviceType.iPhone-15"
          },
          {
            "udid": "B6A3C1E2-0000-4000-8000-000000000001",
            "name": "iPad Air",
            "state": "Shutdown",
            "isAvailable": true,
            "deviceTypeIdentifier": "com.apple.CoreSimulator.SimDeviceType.iPad-Air"
          }
        ],
        "com.apple.CoreSimulator.SimRuntime.watchOS-10-2": [
          {
            "udid": "W0000000-0000-4000-8000-000000000001",
            "name": "Apple Watch Series 9",
            "state": "Booted",
            "isAvailable": true,
            "deviceTypeIdentifier": "com.apple.CoreSimulator.SimDeviceType.Apple-Watch-Series-9"
          }
        ]
      }
    }"#;

    #[test]
    fn keeps_ios_runtimes_sorted_by_name() {
        let records = parse_simctl_devices(SIMCTL_OUTPUT).unwrap();
        let names: Vec<_> = records.iter().map(|record| record.name.as_str()).collect();
        assert_eq!(names, ["iPad Air", "iPhone 15"]);
        assert_eq!(records[1].os_version, "17.2");
        assert!(records[1].is_booted());
        assert!(!records[0].is_booted());
    }

    #[test]
    fn rejects_malformed_output() {
        assert!(parse_simctl_devices("not json").is_err());
    }

    #[test]
    fn parses_simctl_launch_pid_from_bundle_prefix() {
        assert_eq!(
            parse_simctl_launch_pid("com.example.app: 12345\n"),
            Some(12345)
        );
    }

    #[test]
    fn parses_simctl_launch_pid_from_plain_pid() {
        assert_eq!(parse_simctl_launch_pid("12345\n"), Some(12345));
    }

    #[test]
    fn returns_none_when_no_pid_present() {
        assert_eq!(
            parse_simctl_launch_pid("com.example.app: not-a-pid\n"),
            None
        );
    }

    #[test]
    fn simulators_share_one_log_reader() {
        let readers: HashSet<_> = parse_simctl_devices(SIMCTL_OUTPUT)
            .unwrap()
            .into_iter()
            .map(|record| IosSimulator::new("xcrun".into(), record).create_log_reader())
            .collect();
        assert_eq!(readers.len(), 1);
    }
}
