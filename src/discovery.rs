//! Discovery contracts.

use color_eyre::eyre;
use futures::future::BoxFuture;
use smol::channel::Receiver;

use crate::device::AnyDevice;

/// The complete device list returned by one discovery poll.
///
/// Ids are unique within a snapshot; order carries no meaning.
pub type Snapshot = Vec<AnyDevice>;

/// Something that can enumerate the devices of one platform family on demand.
pub trait DiscoverySource: Send + Sync + 'static {
    /// Short label used in logs, e.g. `android`.
    fn name(&self) -> &str;

    /// Whether this source can run on the current host.
    ///
    /// Must be cheap and must not perform I/O.
    fn supports_platform(&self) -> bool;

    /// Probe the hardware and return what is reachable right now.
    ///
    /// Only called when [`supports_platform`](Self::supports_platform) is true.
    fn current_devices(&self) -> impl Future<Output = eyre::Result<Snapshot>> + Send;
}

/// Object-safe view of a polling discoverer, used by the registry to hold engines for
/// different sources side by side.
pub trait DeviceDiscovery: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Whether the underlying source can run on the current host.
    fn supports_platform(&self) -> bool;

    /// Current snapshot, seeding it with one poll if none happened yet.
    fn devices(&self) -> BoxFuture<'_, Snapshot>;

    /// Begin timer-driven polling. Idempotent.
    fn start_polling(&self);

    /// Stop timer-driven polling.
    fn stop_polling(&self);

    /// Stop polling and end every notification stream.
    fn dispose(&self);

    /// Stream of devices that appeared.
    fn on_added(&self) -> Receiver<AnyDevice>;

    /// Stream of devices that disappeared.
    fn on_removed(&self) -> Receiver<AnyDevice>;
}
