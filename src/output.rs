use std::sync::OnceLock;

use color_eyre::eyre::Result;
use serde::Serialize;

use crate::device::{AnyDevice, Platform};

/// Supported output formats for CLI commands.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum OutputFormat {
    /// Styled text for people.
    #[default]
    Human,
    /// One JSON document per line.
    Json,
}

impl OutputFormat {
    /// Check if the format expects JSON payloads.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

static GLOBAL_OUTPUT_FORMAT: OnceLock<OutputFormat> = OnceLock::new();

/// Store the desired global output format used across CLI commands.
pub fn set_global_output_format(format: OutputFormat) {
    let _ = GLOBAL_OUTPUT_FORMAT.set(format);
}

/// Access the configured global output format, defaulting to human-friendly logs.
#[must_use]
pub fn global_output_format() -> OutputFormat {
    *GLOBAL_OUTPUT_FORMAT.get().unwrap_or(&OutputFormat::Human)
}

/// Emit a JSON payload to stdout.
///
/// # Errors
/// Returns an error if the payload cannot be serialized.
pub fn emit_json<T>(payload: &T) -> Result<()>
where
    T: Serialize,
{
    println!("{}", serde_json::to_string(payload)?);
    Ok(())
}

/// Serializable view of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    /// Canonical device id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Platform family.
    pub platform: Platform,
    /// Whether the device is reachable.
    pub connected: bool,
    /// Whether applications can be deployed to it.
    pub supported: bool,
    /// Explanation of the support state.
    pub support_message: String,
}

impl From<&AnyDevice> for DeviceSummary {
    fn from(device: &AnyDevice) -> Self {
        Self {
            id: device.id().to_string(),
            name: device.name().to_string(),
            platform: device.platform(),
            connected: device.is_connected(),
            supported: device.is_supported(),
            support_message: device.support_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;

    #[test]
    fn summarises_devices_as_json() {
        let device = AnyDevice::new(
            FakeDevice::new("emulator-5554", Platform::Android)
                .named("Pixel 8")
                .unsupported(),
        );

        let json = serde_json::to_value(DeviceSummary::from(&device)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "emulator-5554",
                "name": "Pixel 8",
                "platform": "android",
                "connected": true,
                "supported": false,
                "support_message": "Unsupported",
            })
        );
    }

    #[test]
    fn defaults_to_human_output() {
        assert!(!OutputFormat::default().is_json());
        assert!(OutputFormat::Json.is_json());
    }
}
