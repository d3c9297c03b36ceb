//! Choosing at most one target device per platform.
//!
//! For each configured platform the selector looks at the devices present on that platform:
//!
//! 1. with an explicit device id, the candidate whose id matches exactly is chosen, and a
//!    missing match silently yields nothing;
//! 2. otherwise a lone candidate is chosen;
//! 3. several candidates yield nothing plus an [`Advisory`]: the caller is expected to
//!    broadcast to all of them;
//! 4. no candidate yields nothing.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::device::{AnyDevice, Platform};

/// One build/run target: a platform and, optionally, the device to use for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfiguration {
    /// Platform to build and run for.
    #[serde(rename = "platform")]
    pub target_platform: Platform,
    /// Exact id of the device to use.
    #[serde(rename = "device", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl BuildConfiguration {
    /// Target `platform` without naming a device.
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self {
            target_platform: platform,
            device_id: None,
        }
    }

    /// Target a specific device.
    #[must_use]
    pub fn with_device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self
    }
}

/// A non-fatal message describing a degraded but handled condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// Several devices matched a platform and no id narrowed them down.
    MultipleDevices {
        /// Platform concerned.
        platform: Platform,
        /// Number of connected candidates.
        candidates: usize,
    },
}

impl Advisory {
    /// The message, one line per entry.
    #[must_use]
    pub const fn lines(&self) -> [&'static str; 2] {
        match self {
            Self::MultipleDevices { .. } => [
                "Multiple devices are connected, but no device ID was specified.",
                "Attempting to launch on all connected devices.",
            ],
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [first, second] = self.lines();
        write!(f, "{first}\n{second}")
    }
}

/// One platform group to select within.
#[derive(Debug, Clone, Copy)]
pub struct SelectionInput<'a> {
    /// Platform of the group.
    pub platform: Platform,
    /// Exact id of the wanted device, if configured.
    pub device_id: Option<&'a str>,
    /// Devices present on the platform.
    pub candidates: &'a [AnyDevice],
}

/// Outcome of selecting within one platform group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionResult {
    /// Exactly one device was chosen.
    Selected(AnyDevice),
    /// Nothing matched.
    Unselected,
    /// Several candidates and no id to choose between them.
    Ambiguous {
        /// Every candidate, for the caller to broadcast to.
        candidates: Vec<AnyDevice>,
    },
}

impl SelectionResult {
    /// The chosen device, if any.
    #[must_use]
    pub const fn device(&self) -> Option<&AnyDevice> {
        match self {
            Self::Selected(device) => Some(device),
            Self::Unselected | Self::Ambiguous { .. } => None,
        }
    }

    /// Whether the selection was ambiguous.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// Selection outcome for one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The configuration this selection answers.
    pub configuration: BuildConfiguration,
    /// What was chosen.
    pub result: SelectionResult,
}

impl Selection {
    /// Advisory to show for this selection, if any.
    #[must_use]
    pub fn advisory(&self) -> Option<Advisory> {
        match &self.result {
            SelectionResult::Ambiguous { candidates } => Some(Advisory::MultipleDevices {
                platform: self.configuration.target_platform,
                candidates: candidates.len(),
            }),
            SelectionResult::Selected(_) | SelectionResult::Unselected => None,
        }
    }
}

/// Caller configuration errors detected during selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// A second device would be assigned to a platform that already has one.
    #[error("A device is already assigned to {platform}; cannot also assign {device}")]
    PlatformAlreadyAssigned {
        /// Platform concerned.
        platform: Platform,
        /// Id of the device that would have been assigned twice.
        device: String,
    },
}

/// Picks target devices for a set of build configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceSelector;

impl DeviceSelector {
    /// Create a selector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Select within a single platform group.
    #[must_use]
    pub fn select_one(&self, input: SelectionInput<'_>) -> SelectionResult {
        let candidates = input.candidates;
        if let Some(id) = input.device_id {
            return candidates
                .iter()
                .find(|device| device.id() == id)
                .cloned()
                .map_or(SelectionResult::Unselected, SelectionResult::Selected);
        }

        match candidates {
            [] => SelectionResult::Unselected,
            [device] => SelectionResult::Selected(device.clone()),
            _ => SelectionResult::Ambiguous {
                candidates: candidates.to_vec(),
            },
        }
    }

    /// Run one selection pass over `configurations`, drawing candidates from `devices`.
    ///
    /// Returns one [`Selection`] per configuration, in order. Advisories are logged and
    /// available through [`Selection::advisory`].
    ///
    /// # Errors
    /// Returns [`SelectionError::PlatformAlreadyAssigned`] if two configurations for the
    /// same platform would both receive a device.
    pub fn select(
        &self,
        configurations: &[BuildConfiguration],
        devices: &[AnyDevice],
    ) -> Result<Vec<Selection>, SelectionError> {
        let mut assigned: HashMap<Platform, AnyDevice> = HashMap::new();
        let mut selections = Vec::with_capacity(configurations.len());

        for configuration in configurations {
            let platform = configuration.target_platform;
            let candidates: Vec<AnyDevice> = devices
                .iter()
                .filter(|device| device.platform() == platform)
                .cloned()
                .collect();

            let result = self.select_one(SelectionInput {
                platform,
                device_id: configuration.device_id.as_deref(),
                candidates: &candidates,
            });
            if let SelectionResult::Selected(device) = &result {
                if assigned.insert(platform, device.clone()).is_some() {
                    return Err(SelectionError::PlatformAlreadyAssigned {
                        platform,
                        device: device.id().to_string(),
                    });
                }
            }

            let selection = Selection {
                configuration: configuration.clone(),
                result,
            };
            if let Some(advisory) = selection.advisory() {
                warn!(%platform, "{}", advisory.lines().join(" "));
            }
            selections.push(selection);
        }

        Ok(selections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{device, device_on};

    fn input<'a>(device_id: Option<&'a str>, candidates: &'a [AnyDevice]) -> SelectionInput<'a> {
        SelectionInput {
            platform: Platform::Android,
            device_id,
            candidates,
        }
    }

    fn selected_id(result: &SelectionResult) -> Option<&str> {
        result.device().map(|device| device.id())
    }

    #[test]
    fn single_candidate_is_selected() {
        let result = DeviceSelector::new().select_one(input(None, &[device("X")]));
        assert_eq!(selected_id(&result), Some("X"));
    }

    #[test]
    fn several_candidates_are_ambiguous() {
        let selections = DeviceSelector::new()
            .select(
                &[BuildConfiguration::new(Platform::Android)],
                &[device("X"), device("Y")],
            )
            .unwrap();

        assert_eq!(selections.len(), 1);
        assert!(selections[0].result.is_ambiguous());
        assert_eq!(selected_id(&selections[0].result), None);

        let advisories: Vec<_> = selections.iter().filter_map(Selection::advisory).collect();
        assert_eq!(
            advisories,
            [Advisory::MultipleDevices {
                platform: Platform::Android,
                candidates: 2,
            }]
        );
        assert_eq!(
            advisories[0].to_string(),
            "Multiple devices are connected, but no device ID was specified.\n\
             Attempting to launch on all connected devices."
        );
    }

    #[test]
    fn explicit_id_disambiguates() {
        let candidates = [device("X"), device("Y")];
        let result = DeviceSelector::new().select_one(input(Some("Y"), &candidates));
        assert_eq!(selected_id(&result), Some("Y"));
    }

    #[test]
    fn explicit_id_matches_case_sensitively() {
        let candidates = [device("X"), device("Y")];
        let result = DeviceSelector::new().select_one(input(Some("y"), &candidates));
        assert_eq!(result, SelectionResult::Unselected);
    }

    #[test]
    fn no_candidates_selects_nothing_quietly() {
        let selections = DeviceSelector::new()
            .select(&[BuildConfiguration::new(Platform::Ios)], &[device("X")])
            .unwrap();

        assert_eq!(selections[0].result, SelectionResult::Unselected);
        assert!(selections[0].advisory().is_none());
    }

    #[test]
    fn groups_candidates_by_platform() {
        let devices = [
            device_on("emulator-5554", Platform::Android),
            device_on("SIM-1", Platform::IosSimulator),
            device_on("SIM-2", Platform::IosSimulator),
        ];
        let selections = DeviceSelector::new()
            .select(
                &[
                    BuildConfiguration::new(Platform::Android),
                    BuildConfiguration::new(Platform::IosSimulator).with_device_id("SIM-2"),
                ],
                &devices,
            )
            .unwrap();

        assert_eq!(selected_id(&selections[0].result), Some("emulator-5554"));
        assert_eq!(selected_id(&selections[1].result), Some("SIM-2"));
    }

    #[test]
    fn assigning_a_platform_twice_is_rejected() {
        let err = DeviceSelector::new()
            .select(
                &[
                    BuildConfiguration::new(Platform::Android).with_device_id("X"),
                    BuildConfiguration::new(Platform::Android).with_device_id("Y"),
                ],
                &[device("X"), device("Y")],
            )
            .unwrap_err();

        assert_eq!(
            err,
            SelectionError::PlatformAlreadyAssigned {
                platform: Platform::Android,
                device: "Y".to_string(),
            }
        );
    }
}
