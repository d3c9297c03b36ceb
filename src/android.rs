//! Android devices and emulators reachable through `adb`.

use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
    sync::Arc,
};

use color_eyre::eyre;
use futures::{FutureExt, future::BoxFuture};
use tracing::{debug, warn};

use crate::{
    device::{AnyDevice, ApplicationPackage, Device, DeviceError, Platform, StartOptions},
    discovery::{DiscoverySource, Snapshot},
    log_reader::{AnyLogReader, CommandLogReader, LogSource},
    toolchain::Toolchain,
    utils::run_command,
};

/// One line of `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbDeviceEntry {
    /// Device serial, e.g. `emulator-5554`.
    pub serial: String,
    /// Connection state: `device`, `unauthorized`, `offline`...
    pub state: String,
    /// Model name with underscores replaced, or the serial.
    pub name: String,
    /// Remaining `key:value` tokens.
    pub detail: Option<String>,
}

/// Parse the output of `adb devices -l`.
#[must_use]
pub fn parse_adb_devices(output: &str) -> Vec<AdbDeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;

            let mut name = serial.to_string();
            let mut detail_segments = Vec::new();
            for token in parts {
                detail_segments.push(token);
                if let Some(model) = token.strip_prefix("model:") {
                    if !model.is_empty() {
                        name = model.replace('_', " ");
                    }
                }
            }

            Some(AdbDeviceEntry {
                serial: serial.to_string(),
                state: state.to_string(),
                name,
                detail: (!detail_segments.is_empty()).then(|| detail_segments.join(" ")),
            })
        })
        .collect()
}

/// Build the arguments of `adb shell am start` for a package.
///
/// Start options become intent extras; platform arguments are typed by their JSON value.
#[must_use]
pub fn am_start_args(package: &ApplicationPackage, options: &StartOptions) -> Vec<String> {
    let mut args: Vec<String> = ["shell", "am", "start", "-a", "android.intent.action.RUN"]
        .into_iter()
        .map(String::from)
        .collect();

    let mut extra = |kind: &str, key: &str, value: String| {
        args.extend([kind.to_string(), key.to_string(), shell_quote(&value)]);
    };

    if options.checked {
        extra("--ez", "enable-checked-mode", "true".into());
    }
    if options.start_paused {
        extra("--ez", "start-paused", "true".into());
    }
    extra("--ei", "debug-port", options.debug_port.to_string());
    if let Some(main_path) = &options.main_path {
        extra("--es", "main", main_path.clone());
    }
    if let Some(route) = &options.route {
        extra("--es", "route", route.clone());
    }
    for (key, value) in &options.platform_args {
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Bool(flag) => extra("--ez", key.as_str(), flag.to_string()),
            serde_json::Value::Number(number) if number.is_i64() => {
                extra("--ei", key.as_str(), number.to_string());
            }
            serde_json::Value::Number(number) => extra("--ef", key.as_str(), number.to_string()),
            serde_json::Value::String(text) => extra("--es", key.as_str(), text.clone()),
            other => extra("--es", key.as_str(), other.to_string()),
        }
    }

    args.extend(["-n".to_string(), package.launch_activity()]);
    args
}

/// Quote a value for the remote shell `adb shell` runs the command in.
fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Discovers Android devices with `adb devices -l`.
#[derive(Debug, Clone)]
pub struct AndroidDiscovery {
    toolchain: Arc<Toolchain>,
}

impl AndroidDiscovery {
    /// Create a discoverer using the toolchain's `adb`.
    #[must_use]
    pub const fn new(toolchain: Arc<Toolchain>) -> Self {
        Self { toolchain }
    }
}

impl DiscoverySource for AndroidDiscovery {
    fn name(&self) -> &str {
        "android"
    }

    fn supports_platform(&self) -> bool {
        self.toolchain.adb().is_some()
    }

    async fn current_devices(&self) -> eyre::Result<Snapshot> {
        let adb = self.toolchain.require_adb()?;
        let output = run_command(adb, ["devices", "-l"]).await?;

        Ok(parse_adb_devices(&output)
            .into_iter()
            .filter(|entry| entry.state != "offline")
            .map(|entry| AnyDevice::new(AndroidDevice::new(adb.to_path_buf(), entry)))
            .collect())
    }
}

/// An Android device or emulator.
#[derive(Debug, Clone)]
pub struct AndroidDevice {
    adb: PathBuf,
    entry: AdbDeviceEntry,
}

impl AndroidDevice {
    /// Wrap a parsed `adb devices` entry.
    #[must_use]
    pub const fn new(adb: PathBuf, entry: AdbDeviceEntry) -> Self {
        Self { adb, entry }
    }

    /// Serial as reported by `adb`.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.entry.serial
    }

    /// Extra attributes reported by `adb devices -l`.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.entry.detail.as_deref()
    }

    fn is_emulator(&self) -> bool {
        self.entry.serial.starts_with("emulator-")
    }

    async fn run_adb<I, A>(&self, args: I) -> eyre::Result<String>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let mut full: Vec<OsString> = vec!["-s".into(), self.entry.serial.clone().into()];
        full.extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        run_command(&self.adb, full).await
    }

    async fn install_package(&self, package: &ApplicationPackage) -> Result<(), DeviceError> {
        let path = package.path();
        if path.extension().is_none_or(|ext| ext != "apk") {
            return Err(DeviceError::InvalidPackage(format!(
                "{} is not an .apk",
                path.display()
            )));
        }

        self.run_adb([OsStr::new("install"), OsStr::new("-r"), path.as_os_str()])
            .await
            .map_err(DeviceError::Install)?;
        Ok(())
    }

    async fn package_installed(&self, package: &ApplicationPackage) -> Result<bool, DeviceError> {
        let output = self
            .run_adb(["shell", "pm", "list", "packages", package.id()])
            .await
            .map_err(DeviceError::Query)?;
        let wanted = format!("package:{}", package.id());
        Ok(output.lines().any(|line| line.trim() == wanted))
    }

    async fn start(
        &self,
        package: &ApplicationPackage,
        options: &StartOptions,
    ) -> Result<(), DeviceError> {
        if options.clear_logs {
            self.run_adb(["logcat", "-c"])
                .await
                .map_err(DeviceError::Launch)?;
        }

        let port = format!("tcp:{}", options.debug_port);
        if let Err(err) = self.run_adb(["forward", port.as_str(), port.as_str()]).await {
            warn!(serial = %self.entry.serial, "Failed to forward debug port: {err}");
        }

        let output = self
            .run_adb(am_start_args(package, options))
            .await
            .map_err(DeviceError::Launch)?;
        // `am start` exits with 0 even when the activity cannot be resolved.
        if let Some(line) = output.lines().find(|line| line.starts_with("Error")) {
            return Err(DeviceError::Launch(eyre::eyre!("{}", line.trim())));
        }

        debug!(serial = %self.entry.serial, package = package.id(), "started application");
        Ok(())
    }

    async fn stop(&self, package: &ApplicationPackage) -> Result<(), DeviceError> {
        self.run_adb(["shell", "am", "force-stop", package.id()])
            .await
            .map_err(DeviceError::Stop)?;
        Ok(())
    }
}

impl Device for AndroidDevice {
    fn id(&self) -> &str {
        &self.entry.serial
    }

    fn name(&self) -> &str {
        &self.entry.name
    }

    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn is_connected(&self) -> bool {
        self.entry.state != "offline"
    }

    fn is_supported(&self) -> bool {
        self.entry.state == "device"
    }

    fn support_message(&self) -> String {
        match self.entry.state.as_str() {
            "device" if self.is_emulator() => "Supported (emulator)".to_string(),
            "device" => "Supported".to_string(),
            "unauthorized" => {
                "Unauthorized: accept the USB debugging prompt on the device".to_string()
            }
            other => format!("Unsupported (state: {other})"),
        }
    }

    fn install<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.install_package(package).boxed()
    }

    fn is_app_installed<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<bool, DeviceError>> {
        self.package_installed(package).boxed()
    }

    fn create_log_reader(&self) -> AnyLogReader {
        let serial = self.entry.serial.clone();
        AnyLogReader::new(
            CommandLogReader::new(
                self.entry.name.clone(),
                LogSource::Logcat {
                    serial: serial.clone(),
                },
                self.adb.clone(),
                ["-s".to_string(), serial.clone(), "logcat".into(), "-v".into(), "brief".into()],
            )
            .with_clear_args(["-s".to_string(), serial, "logcat".into(), "-c".into()]),
        )
    }

    fn start_app<'a>(
        &'a self,
        package: &'a ApplicationPackage,
        _toolchain: &'a Toolchain,
        options: &'a StartOptions,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.start(package, options).boxed()
    }

    fn stop_app<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.stop(package).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADB_OUTPUT: &str = "\
* daemon not running; starting now at tcp:5037
* daemon started successfully
List of devices attached
emulator-5554          device product:sdk_gphone64_arm64 model:sdk_gphone64_arm64 device:emu64a transport_id:1
R58M12ABCDE            unauthorized usb:1-1 transport_id:2
0123456789ABCDEF       offline

";

    #[test]
    fn parses_adb_device_list() {
        let entries = parse_adb_devices(ADB_OUTPUT);
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].serial, "emulator-5554");
        assert_eq!(entries[0].state, "device");
        assert_eq!(entries[0].name, "sdk gphone64 arm64");
        assert_eq!(
            entries[0].detail.as_deref(),
            Some(
                "product:sdk_gphone64_arm64 model:sdk_gphone64_arm64 device:emu64a transport_id:1"
            )
        );

        assert_eq!(entries[1].name, "R58M12ABCDE");
        assert_eq!(entries[1].state, "unauthorized");
        assert_eq!(entries[2].detail, None);
    }

    #[test]
    fn empty_device_list() {
        assert!(parse_adb_devices("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn support_follows_adb_state() {
        let entries = parse_adb_devices(ADB_OUTPUT);
        let emulator = AndroidDevice::new("adb".into(), entries[0].clone());
        let unauthorized = AndroidDevice::new("adb".into(), entries[1].clone());
        let offline = AndroidDevice::new("adb".into(), entries[2].clone());

        assert!(emulator.is_supported());
        assert_eq!(emulator.support_message(), "Supported (emulator)");
        assert!(unauthorized.is_connected());
        assert!(!unauthorized.is_supported());
        assert!(unauthorized.support_message().starts_with("Unauthorized"));
        assert!(!offline.is_connected());
    }

    #[test]
    fn builds_am_start_arguments() {
        let package = ApplicationPackage::new("dev.waterui.demo", "demo", "demo.apk");
        let mut options = StartOptions {
            route: Some("/settings page".to_string()),
            start_paused: true,
            ..StartOptions::default()
        };
        options
            .platform_args
            .insert("trace-startup".into(), serde_json::json!(true));
        options
            .platform_args
            .insert("scale".into(), serde_json::json!(1.5));
        options
            .platform_args
            .insert("retries".into(), serde_json::json!(3));
        options
            .platform_args
            .insert("ignored".into(), serde_json::Value::Null);

        assert_eq!(
            am_start_args(&package, &options).join(" "),
            "shell am start -a android.intent.action.RUN \
             --ez enable-checked-mode true \
             --ez start-paused true \
             --ei debug-port 8181 \
             --es route '/settings page' \
             --ei retries 3 \
             --ef scale 1.5 \
             --ez trace-startup true \
             -n dev.waterui.demo/.MainActivity"
        );
    }

    #[test]
    fn log_readers_are_keyed_by_serial() {
        let entries = parse_adb_devices(ADB_OUTPUT);
        let first = AndroidDevice::new("adb".into(), entries[0].clone()).create_log_reader();
        let again = AndroidDevice::new("adb".into(), entries[0].clone()).create_log_reader();
        let other = AndroidDevice::new("adb".into(), entries[1].clone()).create_log_reader();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(
            first.source(),
            LogSource::Logcat {
                serial: "emulator-5554".into()
            }
        );
    }

    #[test]
    fn rejects_non_apk_packages() {
        let entries = parse_adb_devices(ADB_OUTPUT);
        let device = AndroidDevice::new("adb".into(), entries[0].clone());
        let package = ApplicationPackage::new("dev.waterui.demo", "demo", "demo.app");

        let err = smol::block_on(device.install(&package)).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidPackage(_)));
    }
}
