//! CLI command implementations.

pub mod list;
pub mod select;
pub mod watch;

use std::{path::Path, sync::Arc};

use color_eyre::eyre::Result;
use console::style;
use tracing::debug;
use waterui_device::{AnyDevice, DeviceRegistry, Toolchain, config::Config};

/// State shared by every command: the project configuration and a device registry.
pub struct Session {
    /// Contents of `Water.toml`, or defaults.
    pub config: Config,
    /// Registry over every platform family.
    pub registry: DeviceRegistry,
}

impl Session {
    /// Load `Water.toml` from `project` and build the registry.
    ///
    /// A `--device` flag takes precedence over `devices.device` from the configuration.
    pub fn open(project: &Path, device: Option<String>) -> Result<Self> {
        let config = Config::load(project)?;
        let toolchain = Arc::new(Toolchain::detect());
        let filter = device.or_else(|| config.devices.device.clone());
        debug!(?filter, interval = ?config.poll_interval(), "opening device registry");

        let registry = DeviceRegistry::with_default_discoverers(&toolchain, config.poll_interval())
            .with_specified_device_id(filter);
        Ok(Self { config, registry })
    }
}

/// Print one device as a styled bullet, with its id and support state below.
pub fn print_device(device: &AnyDevice) {
    let state = if device.is_supported() {
        style(device.support_message()).green()
    } else {
        style(device.support_message()).red()
    };
    println!(
        "  {} {} ({})",
        style("•").cyan(),
        style(device.name()).bold(),
        state
    );
    println!("      {}", style(format!("id: {}", device.id())).dim());
}
