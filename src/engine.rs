//! Timer-driven discovery with incremental change notifications.
//!
//! A [`PollingDiscoveryEngine`] owns one [`DiscoverySource`]. While polling, every tick probes
//! the source, diffs the result against the retained snapshot, commits the new snapshot and
//! publishes the difference on the `on_added` / `on_removed` streams.
//!
//! Polls of one source never overlap. Timer ticks take the poll gate with `try_lock` and are
//! dropped when a poll is still in flight; the poll on entering the polling state and seeding
//! reads from [`devices`] wait for the gate instead. Each poll runs in its own task, so [`stop`] never cancels a probe halfway: the
//! in-flight result is still committed, only future ticks are prevented.
//!
//! [`devices`]: PollingDiscoveryEngine::devices
//! [`stop`]: PollingDiscoveryEngine::stop

use std::{
    fmt::{self, Debug},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{
    FutureExt,
    future::BoxFuture,
    stream::{BoxStream, StreamExt},
};
use smol::{
    Task, Timer,
    channel::{self, Receiver, Sender},
    lock::{Mutex as AsyncMutex, MutexGuardArc},
    spawn,
};
use tracing::{debug, info, trace, warn};

use crate::{
    device::AnyDevice,
    diff::{ChangeSet, diff},
    discovery::{DeviceDiscovery, DiscoverySource, Snapshot},
};

/// Interval between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// A stream yielding one item per timer interval.
pub type Ticks = BoxStream<'static, ()>;

type TickerFactory = Box<dyn Fn() -> Ticks + Send + Sync>;

enum SnapshotState {
    /// No poll has completed yet.
    Unseeded,
    Seeded(Snapshot),
}

#[derive(Default)]
struct Subscribers {
    added: Vec<Sender<AnyDevice>>,
    removed: Vec<Sender<AnyDevice>>,
}

struct Shared<S> {
    source: S,
    state: Mutex<SnapshotState>,
    gate: Arc<AsyncMutex<()>>,
    subscribers: Mutex<Subscribers>,
    /// Bumped by every `start` and `stop`; a timer only ticks while its epoch is current.
    epoch: AtomicU64,
    consecutive_failures: AtomicUsize,
    dropped_ticks: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: DiscoverySource> Shared<S> {
    fn snapshot(&self) -> Option<Snapshot> {
        match &*lock(&self.state) {
            SnapshotState::Unseeded => None,
            SnapshotState::Seeded(snapshot) => Some(snapshot.clone()),
        }
    }

    fn tick(self: &Arc<Self>, epoch: u64) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }

        let Some(gate) = self.gate.try_lock_arc() else {
            self.dropped_ticks.fetch_add(1, Ordering::SeqCst);
            trace!(source = self.source.name(), "Poll still in flight, dropping tick");
            return;
        };

        self.spawn_poll(gate);
    }

    /// The poll on entering the polling state. Waits out a poll left over from before a restart.
    async fn first_tick(self: &Arc<Self>, epoch: u64) {
        let gate = self.gate.lock_arc().await;
        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.spawn_poll(gate);
        }
    }

    fn spawn_poll(self: &Arc<Self>, gate: MutexGuardArc<()>) {
        let shared = Arc::clone(self);
        spawn(async move { shared.poll(gate).await }).detach();
    }

    async fn poll(self: Arc<Self>, _gate: MutexGuardArc<()>) {
        let name = self.source.name();
        debug!(source = name, "Polling for devices");

        match self.source.current_devices().await {
            Ok(snapshot) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                let changes = self.commit(snapshot);
                self.publish(changes);
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(source = name, failures, "Device probe failed: {err:#}");

                // Keep what we knew; an unseeded engine still becomes readable.
                let mut state = lock(&self.state);
                if matches!(*state, SnapshotState::Unseeded) {
                    *state = SnapshotState::Seeded(Vec::new());
                }
            }
        }
    }

    fn commit(&self, snapshot: Snapshot) -> ChangeSet {
        let mut state = lock(&self.state);
        let changes = match &*state {
            SnapshotState::Unseeded => diff(&[], &snapshot),
            SnapshotState::Seeded(previous) => diff(previous, &snapshot),
        };
        *state = SnapshotState::Seeded(snapshot);
        changes
    }

    fn publish(&self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }

        let name = self.source.name();
        let mut subscribers = lock(&self.subscribers);
        for device in changes.added {
            info!(source = name, id = device.id(), "Device connected: {}", device.name());
            subscribers
                .added
                .retain(|sender| sender.try_send(device.clone()).is_ok());
        }
        for device in changes.removed {
            info!(source = name, id = device.id(), "Device disconnected: {}", device.name());
            subscribers
                .removed
                .retain(|sender| sender.try_send(device.clone()).is_ok());
        }
    }
}

/// Polls a [`DiscoverySource`] on a fixed interval and publishes changes.
///
/// The engine starts in the stopped state. [`start`](Self::start) polls immediately and then
/// once per interval; calling it again while polling does nothing.
pub struct PollingDiscoveryEngine<S> {
    shared: Arc<Shared<S>>,
    ticker: TickerFactory,
    timer: Mutex<Option<Task<()>>>,
}

impl<S> Debug for PollingDiscoveryEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingDiscoveryEngine")
            .field("polling", &lock(&self.timer).is_some())
            .finish_non_exhaustive()
    }
}

impl<S: DiscoverySource> PollingDiscoveryEngine<S> {
    /// Create an engine polling every [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub fn new(source: S) -> Self {
        Self::with_interval(source, DEFAULT_POLL_INTERVAL)
    }

    /// Create an engine polling every `interval`.
    #[must_use]
    pub fn with_interval(source: S, interval: Duration) -> Self {
        Self::with_ticker(source, move || {
            StreamExt::map(Timer::interval(interval), |_| ()).boxed()
        })
    }

    /// Create an engine driven by a custom tick stream.
    ///
    /// `ticker` is invoked once per [`start`](Self::start) that actually creates a timer.
    pub fn with_ticker(source: S, ticker: impl Fn() -> Ticks + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                state: Mutex::new(SnapshotState::Unseeded),
                gate: Arc::new(AsyncMutex::new(())),
                subscribers: Mutex::new(Subscribers::default()),
                epoch: AtomicU64::new(0),
                consecutive_failures: AtomicUsize::new(0),
                dropped_ticks: AtomicUsize::new(0),
            }),
            ticker: Box::new(ticker),
            timer: Mutex::new(None),
        }
    }

    /// The wrapped source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.shared.source
    }

    /// Whether a timer is active.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        lock(&self.timer).is_some()
    }

    /// Start polling. Does nothing if already polling.
    pub fn start(&self) {
        let mut timer = lock(&self.timer);
        if timer.is_some() {
            return;
        }

        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(source = self.shared.source.name(), "Starting device polling");

        let shared = Arc::clone(&self.shared);
        let mut ticks = (self.ticker)();
        *timer = Some(spawn(async move {
            shared.first_tick(epoch).await;
            while ticks.next().await.is_some() {
                shared.tick(epoch);
            }
        }));
    }

    /// Stop polling.
    ///
    /// A poll already in flight finishes and its result is committed, but no further tick
    /// will fire.
    pub fn stop(&self) {
        let timer = lock(&self.timer).take();
        if timer.is_some() {
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            debug!(source = self.shared.source.name(), "Stopped device polling");
        }
        // Dropping the task cancels the tick loop.
        drop(timer);
    }

    /// Stop polling and release every subscriber, ending their streams.
    pub fn dispose(&self) {
        self.stop();
        *lock(&self.shared.subscribers) = Subscribers::default();
    }

    /// Current snapshot.
    ///
    /// If the engine has never polled, this performs one poll first, waiting for any poll
    /// already in flight rather than starting a concurrent one.
    pub async fn devices(&self) -> Snapshot {
        if let Some(snapshot) = self.shared.snapshot() {
            return snapshot;
        }

        let gate = self.shared.gate.lock_arc().await;
        if let Some(snapshot) = self.shared.snapshot() {
            return snapshot;
        }
        Arc::clone(&self.shared).poll(gate).await;
        self.shared.snapshot().unwrap_or_default()
    }

    /// Subscribe to devices that appear from now on.
    #[must_use]
    pub fn on_added(&self) -> Receiver<AnyDevice> {
        let (sender, receiver) = channel::unbounded();
        lock(&self.shared.subscribers).added.push(sender);
        receiver
    }

    /// Subscribe to devices that disappear from now on.
    #[must_use]
    pub fn on_removed(&self) -> Receiver<AnyDevice> {
        let (sender, receiver) = channel::unbounded();
        lock(&self.shared.subscribers).removed.push(sender);
        receiver
    }

    /// Number of failed probes since the last successful one.
    #[must_use]
    pub fn consecutive_failures(&self) -> usize {
        self.shared.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Number of ticks dropped because a poll was still in flight.
    #[must_use]
    pub fn dropped_ticks(&self) -> usize {
        self.shared.dropped_ticks.load(Ordering::SeqCst)
    }

    /// Wait until no poll is in flight.
    #[cfg(test)]
    async fn settle(&self) {
        drop(self.shared.gate.lock().await);
    }
}

impl<S> Drop for PollingDiscoveryEngine<S> {
    fn drop(&mut self) {
        if lock(&self.timer).take().is_some() {
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl<S: DiscoverySource> DeviceDiscovery for PollingDiscoveryEngine<S> {
    fn name(&self) -> &str {
        self.shared.source.name()
    }

    fn supports_platform(&self) -> bool {
        self.shared.source.supports_platform()
    }

    fn devices(&self) -> BoxFuture<'_, Snapshot> {
        Self::devices(self).boxed()
    }

    fn start_polling(&self) {
        self.start();
    }

    fn stop_polling(&self) {
        self.stop();
    }

    fn dispose(&self) {
        Self::dispose(self);
    }

    fn on_added(&self) -> Receiver<AnyDevice> {
        Self::on_added(self)
    }

    fn on_removed(&self) -> Receiver<AnyDevice> {
        Self::on_removed(self)
    }
}
