use std::{
    collections::BTreeMap,
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    ops::Deref,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use color_eyre::eyre;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{log_reader::AnyLogReader, toolchain::Toolchain};

/// Debug port handed to an application when none is configured.
pub const DEFAULT_DEBUG_PORT: u16 = 8181;

/// Platform family a device belongs to.
///
/// Selection groups candidates by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Physical Android devices and emulators reachable through `adb`.
    Android,
    /// Physical iOS devices.
    Ios,
    /// iOS simulators managed by `simctl`.
    IosSimulator,
    /// The current machine when it runs macOS.
    Mac,
    /// The current machine when it runs Linux.
    Linux,
}

impl Platform {
    /// Every platform, in display order.
    pub const ALL: [Self; 5] = [
        Self::Android,
        Self::Ios,
        Self::IosSimulator,
        Self::Mac,
        Self::Linux,
    ];

    /// Stable identifier used in configuration files and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
            Self::IosSimulator => "ios_simulator",
            Self::Mac => "mac",
            Self::Linux => "linux",
        }
    }

    /// Human-friendly label.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Android => "Android",
            Self::Ios => "iOS device",
            Self::IosSimulator => "iOS simulator",
            Self::Mac => "macOS",
            Self::Linux => "Linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a [`Platform`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown platform `{0}` (expected one of: android, ios, ios_simulator, mac, linux)")]
pub struct UnknownPlatform(String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|platform| platform.as_str() == normalized)
            .or_else(|| match normalized.as_str() {
                "macos" => Some(Self::Mac),
                "simulator" | "iossimulator" => Some(Self::IosSimulator),
                _ => None,
            })
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

/// An application package to push to a device.
///
/// The package is opaque to discovery; only devices look inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationPackage {
    id: String,
    name: String,
    path: PathBuf,
    launch_activity: Option<String>,
}

impl ApplicationPackage {
    /// Create a new package.
    ///
    /// `id` is the bundle identifier (Apple) or package name (Android).
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            launch_activity: None,
        }
    }

    /// Set the Android activity to launch, e.g. `com.example/.MainActivity`.
    #[must_use]
    pub fn with_launch_activity(mut self, activity: impl Into<String>) -> Self {
        self.launch_activity = Some(activity.into());
        self
    }

    /// Bundle identifier or package name.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, also used as the process name on the host.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path to the built artifact (`.apk`, `.app` or executable).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Android activity to launch, falling back to `<id>/.MainActivity`.
    #[must_use]
    pub fn launch_activity(&self) -> String {
        self.launch_activity
            .clone()
            .unwrap_or_else(|| format!("{}/.MainActivity", self.id))
    }
}

/// Options for starting an application on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartOptions {
    /// Entry point of the application, relative to the project root.
    pub main_path: Option<String>,
    /// Initial route to open.
    pub route: Option<String>,
    /// Run with runtime assertions enabled.
    pub checked: bool,
    /// Clear the device log before starting.
    pub clear_logs: bool,
    /// Pause the application until a debugger attaches.
    pub start_paused: bool,
    /// Port the application exposes its debug service on.
    pub debug_port: u16,
    /// Free-form, platform-specific arguments.
    pub platform_args: BTreeMap<String, serde_json::Value>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            main_path: None,
            route: None,
            checked: true,
            clear_logs: false,
            start_paused: false,
            debug_port: DEFAULT_DEBUG_PORT,
            platform_args: BTreeMap::new(),
        }
    }
}

impl StartOptions {
    /// Create options with every field at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the options as `--flag[=value]` launch arguments.
    ///
    /// Apple devices and the host pass these straight to the launched process.
    #[must_use]
    pub fn launch_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.checked {
            flags.push("--enable-checked-mode".to_string());
        }
        if self.start_paused {
            flags.push("--start-paused".to_string());
        }
        flags.push(format!("--debug-port={}", self.debug_port));
        if let Some(main_path) = &self.main_path {
            flags.push(format!("--main={main_path}"));
        }
        if let Some(route) = &self.route {
            flags.push(format!("--route={route}"));
        }
        for (key, value) in &self.platform_args {
            match value {
                serde_json::Value::Bool(true) => flags.push(format!("--{key}")),
                serde_json::Value::Bool(false) | serde_json::Value::Null => {}
                serde_json::Value::String(value) => flags.push(format!("--{key}={value}")),
                other => flags.push(format!("--{key}={other}")),
            }
        }
        flags
    }
}

/// Errors that can occur when operating on a device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// A required command-line tool is missing.
    #[error("`{0}` not found. Install it or make sure it is on your PATH.")]
    ToolNotFound(&'static str),

    /// The package cannot be used on this device.
    #[error("Invalid application package: {0}")]
    InvalidPackage(String),

    /// The device does not implement the requested operation.
    #[error("{operation} is not supported on {platform} devices")]
    Unsupported {
        /// Name of the operation.
        operation: &'static str,
        /// Platform of the device.
        platform: Platform,
    },

    /// Failed to install the application on the device.
    #[error("Failed to install application on device: {0}")]
    Install(eyre::Report),

    /// Failed to query the device.
    #[error("Failed to query device: {0}")]
    Query(eyre::Report),

    /// Failed to start the application on the device.
    #[error("Failed to start application on device: {0}")]
    Launch(eyre::Report),

    /// Failed to stop the application on the device.
    #[error("Failed to stop application on device: {0}")]
    Stop(eyre::Report),
}

/// A single addressable target.
///
/// Identity is [`Device::id`] alone: two devices with the same id are the same logical device,
/// whatever their other attributes say. [`AnyDevice`] builds equality and hashing on it.
pub trait Device: Send + Sync + 'static {
    /// Canonical, case-sensitive identifier.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Platform family.
    fn platform(&self) -> Platform;

    /// Whether the device is currently reachable.
    fn is_connected(&self) -> bool;

    /// Whether applications can be deployed to the device.
    fn is_supported(&self) -> bool;

    /// Explanation of the support state.
    fn support_message(&self) -> String {
        if self.is_supported() {
            "Supported".to_string()
        } else {
            "Unsupported".to_string()
        }
    }

    /// Install the package on the device.
    fn install<'a>(&'a self, package: &'a ApplicationPackage)
    -> BoxFuture<'a, Result<(), DeviceError>>;

    /// Check whether the package is already installed.
    fn is_app_installed<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<bool, DeviceError>>;

    /// Create a reader for the device's log.
    fn create_log_reader(&self) -> AnyLogReader;

    /// Start the installed package.
    fn start_app<'a>(
        &'a self,
        package: &'a ApplicationPackage,
        toolchain: &'a Toolchain,
        options: &'a StartOptions,
    ) -> BoxFuture<'a, Result<(), DeviceError>>;

    /// Stop the running package.
    fn stop_app<'a>(
        &'a self,
        package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>>;
}

/// Shared handle to a device, compared and hashed by id.
#[derive(Clone)]
pub struct AnyDevice(Arc<dyn Device>);

impl AnyDevice {
    /// Wrap a concrete device.
    pub fn new(device: impl Device) -> Self {
        Self(Arc::new(device))
    }
}

impl Deref for AnyDevice {
    type Target = dyn Device;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for AnyDevice {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for AnyDevice {}

impl Hash for AnyDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Debug for AnyDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyDevice")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("platform", &self.platform())
            .finish()
    }
}

impl fmt::Display for AnyDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::testing::FakeDevice;

    #[test]
    fn equality_is_id_only() {
        let a = AnyDevice::new(FakeDevice::new("emulator-5554", Platform::Android).named("Pixel"));
        let b = AnyDevice::new(FakeDevice::new("emulator-5554", Platform::Linux).named("Other"));
        let c = AnyDevice::new(FakeDevice::new("EMULATOR-5554", Platform::Android));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn support_message_follows_support_state() {
        let supported = FakeDevice::new("a", Platform::Android);
        let unsupported = FakeDevice::new("b", Platform::Android).unsupported();
        assert_eq!(supported.support_message(), "Supported");
        assert_eq!(unsupported.support_message(), "Unsupported");
    }

    #[test]
    fn start_options_defaults() {
        let options = StartOptions::default();
        assert!(options.checked);
        assert!(!options.clear_logs);
        assert!(!options.start_paused);
        assert_eq!(options.debug_port, DEFAULT_DEBUG_PORT);
        assert!(options.platform_args.is_empty());
    }

    #[test]
    fn start_options_deserialize_with_defaults() {
        let options: StartOptions = toml::from_str(
            r#"
            route = "/settings"
            start_paused = true

            [platform_args]
            trace-startup = true
            locale = "fr"
            "#,
        )
        .unwrap();

        assert_eq!(options.route.as_deref(), Some("/settings"));
        assert!(options.start_paused);
        assert!(options.checked);
        assert_eq!(options.debug_port, DEFAULT_DEBUG_PORT);
        assert_eq!(
            options.launch_flags(),
            vec![
                "--enable-checked-mode",
                "--start-paused",
                "--debug-port=8181",
                "--route=/settings",
                "--locale=fr",
                "--trace-startup",
            ]
        );
    }

    #[test]
    fn parses_platform_names() {
        assert_eq!("android".parse::<Platform>(), Ok(Platform::Android));
        assert_eq!("iOS-Simulator".parse::<Platform>(), Ok(Platform::IosSimulator));
        assert_eq!("macos".parse::<Platform>(), Ok(Platform::Mac));
        assert!("windows".parse::<Platform>().is_err());
    }

    #[test]
    fn package_defaults_to_main_activity() {
        let package = ApplicationPackage::new("com.example.app", "app", "app.apk");
        assert_eq!(package.launch_activity(), "com.example.app/.MainActivity");

        let custom = package.with_launch_activity("com.example.app/.Launcher");
        assert_eq!(custom.launch_activity(), "com.example.app/.Launcher");
    }
}
