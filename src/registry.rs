//! Aggregation of every discoverer the tool knows about.

use std::{fmt, sync::Arc, time::Duration};

use futures::{
    future::{join_all, ready},
    stream::{self, BoxStream, StreamExt},
};

use crate::{
    android::AndroidDiscovery,
    apple::{device::IosDeviceDiscovery, simulator::IosSimulatorDiscovery},
    device::AnyDevice,
    discovery::DeviceDiscovery,
    engine::PollingDiscoveryEngine,
    host::HostDiscovery,
    toolchain::Toolchain,
};

/// A device appearing or disappearing, as observed by any discoverer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChange {
    /// The device became reachable.
    Added(AnyDevice),
    /// The device is no longer reachable.
    Removed(AnyDevice),
}

impl DeviceChange {
    /// The device concerned.
    #[must_use]
    pub const fn device(&self) -> &AnyDevice {
        match self {
            Self::Added(device) | Self::Removed(device) => device,
        }
    }
}

/// Answers "which devices are there" across all platform families.
///
/// Discoverers are registered once at construction. Construction performs no I/O; each
/// discoverer polls lazily on first use.
pub struct DeviceRegistry {
    discoverers: Vec<Box<dyn DeviceDiscovery>>,
    specified_device_id: Option<String>,
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field(
                "discoverers",
                &self.discoverers.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .field("specified_device_id", &self.specified_device_id)
            .finish()
    }
}

impl DeviceRegistry {
    /// Create a registry over the given discoverers.
    #[must_use]
    pub fn new(discoverers: Vec<Box<dyn DeviceDiscovery>>) -> Self {
        Self {
            discoverers,
            specified_device_id: None,
        }
    }

    /// Create a registry with one engine per supported platform family.
    #[must_use]
    pub fn with_default_discoverers(toolchain: &Arc<Toolchain>, poll_interval: Duration) -> Self {
        Self::new(vec![
            Box::new(PollingDiscoveryEngine::with_interval(
                AndroidDiscovery::new(Arc::clone(toolchain)),
                poll_interval,
            )),
            Box::new(PollingDiscoveryEngine::with_interval(
                IosDeviceDiscovery::new(Arc::clone(toolchain)),
                poll_interval,
            )),
            Box::new(PollingDiscoveryEngine::with_interval(
                IosSimulatorDiscovery::new(Arc::clone(toolchain)),
                poll_interval,
            )),
            Box::new(PollingDiscoveryEngine::with_interval(
                HostDiscovery::new(),
                poll_interval,
            )),
        ])
    }

    /// Restrict [`devices`](Self::devices) to the device with this id.
    #[must_use]
    pub fn with_specified_device_id(mut self, id: Option<String>) -> Self {
        self.specified_device_id = id.filter(|id| !id.trim().is_empty());
        self
    }

    /// The user's device filter, if any.
    #[must_use]
    pub fn specified_device_id(&self) -> Option<&str> {
        self.specified_device_id.as_deref()
    }

    /// Whether the user asked for a specific device.
    #[must_use]
    pub const fn has_specified_device_id(&self) -> bool {
        self.specified_device_id.is_some()
    }

    /// Discoverers that can run on this host.
    pub fn supported_discoverers(&self) -> impl Iterator<Item = &dyn DeviceDiscovery> {
        self.discoverers
            .iter()
            .map(|discoverer| &**discoverer)
            .filter(|discoverer| discoverer.supports_platform())
    }

    /// Every device of every supported discoverer, in registration order.
    ///
    /// Discoverers are read concurrently, so a slow probe only delays its own platform.
    /// Ids are not deduplicated across discoverers.
    pub async fn all_connected_devices(&self) -> Vec<AnyDevice> {
        join_all(self.supported_discoverers().map(|discoverer| discoverer.devices()))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Find a connected device by id, ignoring case.
    pub async fn device_by_id(&self, id: &str) -> Option<AnyDevice> {
        self.all_connected_devices()
            .await
            .into_iter()
            .find(|device| device.id().eq_ignore_ascii_case(id))
    }

    /// Whether `device` passes the user's device filter. Always true without one.
    #[must_use]
    pub fn is_targeted(&self, device: &AnyDevice) -> bool {
        self.specified_device_id
            .as_deref()
            .is_none_or(|id| device.id().eq_ignore_ascii_case(id))
    }

    /// Devices the user is allowed to target.
    ///
    /// Without a filter this is [`all_connected_devices`](Self::all_connected_devices);
    /// with one it holds the matching device, or nothing.
    pub async fn devices(&self) -> Vec<AnyDevice> {
        match &self.specified_device_id {
            None => self.all_connected_devices().await,
            Some(id) => self.device_by_id(id).await.into_iter().collect(),
        }
    }

    /// Start polling every supported discoverer.
    pub fn start_polling(&self) {
        for discoverer in self.supported_discoverers() {
            discoverer.start_polling();
        }
    }

    /// Stop polling every discoverer.
    pub fn stop_polling(&self) {
        for discoverer in &self.discoverers {
            discoverer.stop_polling();
        }
    }

    /// Stop polling and end every change stream.
    pub fn dispose(&self) {
        for discoverer in &self.discoverers {
            discoverer.dispose();
        }
    }

    /// Merged stream of changes from every supported discoverer.
    ///
    /// The stream ends once every discoverer has been disposed.
    #[must_use]
    pub fn changes(&self) -> BoxStream<'static, DeviceChange> {
        let streams = self.supported_discoverers().flat_map(|discoverer| {
            [
                discoverer.on_added().map(DeviceChange::Added).boxed(),
                discoverer.on_removed().map(DeviceChange::Removed).boxed(),
            ]
        });
        stream::select_all(streams).boxed()
    }

    /// [`changes`](Self::changes) restricted to devices passing the user's device filter.
    #[must_use]
    pub fn targeted_changes(&self) -> BoxStream<'static, DeviceChange> {
        let filter = self.specified_device_id.clone();
        self.changes()
            .filter(move |change| {
                let keep = filter
                    .as_deref()
                    .is_none_or(|id| change.device().id().eq_ignore_ascii_case(id));
                ready(keep)
            })
            .boxed()
    }
}
