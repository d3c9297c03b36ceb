//! Fakes shared by unit tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use color_eyre::eyre;
use futures::{
    FutureExt,
    future::BoxFuture,
    stream::{BoxStream, StreamExt},
};
use smol::{
    Timer,
    channel::{self, Receiver, Sender},
};

use crate::{
    device::{AnyDevice, ApplicationPackage, Device, DeviceError, Platform, StartOptions},
    discovery::{DiscoverySource, Snapshot},
    log_reader::{AnyLogReader, CommandLogReader, LogSource},
    toolchain::Toolchain,
};

#[derive(Debug, Clone)]
pub struct FakeDevice {
    id: String,
    name: String,
    platform: Platform,
    supported: bool,
}

impl FakeDevice {
    pub fn new(id: &str, platform: Platform) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            platform,
            supported: true,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub const fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }
}

impl Device for FakeDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn install<'a>(
        &'a self,
        _package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        async { Ok(()) }.boxed()
    }

    fn is_app_installed<'a>(
        &'a self,
        _package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<bool, DeviceError>> {
        async { Ok(false) }.boxed()
    }

    fn create_log_reader(&self) -> AnyLogReader {
        AnyLogReader::new(CommandLogReader::new(
            self.name.clone(),
            LogSource::Host,
            "true",
            Vec::<String>::new(),
        ))
    }

    fn start_app<'a>(
        &'a self,
        _package: &'a ApplicationPackage,
        _toolchain: &'a Toolchain,
        _options: &'a StartOptions,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        async { Ok(()) }.boxed()
    }

    fn stop_app<'a>(
        &'a self,
        _package: &'a ApplicationPackage,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        async { Ok(()) }.boxed()
    }
}

/// An Android fake device with the given id.
pub fn device(id: &str) -> AnyDevice {
    AnyDevice::new(FakeDevice::new(id, Platform::Android))
}

pub fn device_on(id: &str, platform: Platform) -> AnyDevice {
    AnyDevice::new(FakeDevice::new(id, platform))
}

struct SourceState {
    supported: bool,
    response: Mutex<Result<Snapshot, String>>,
    calls: AtomicUsize,
    polled: (Sender<()>, Receiver<()>),
    gate: Option<(Sender<()>, Receiver<()>)>,
    delay: Option<Duration>,
}

/// Scripted discovery source. Clones share state, so a test can keep a handle after moving
/// one into an engine.
#[derive(Clone)]
pub struct FakeSource(Arc<SourceState>);

impl FakeSource {
    pub fn new(devices: Vec<AnyDevice>) -> Self {
        Self(Arc::new(SourceState {
            supported: true,
            response: Mutex::new(Ok(devices)),
            calls: AtomicUsize::new(0),
            polled: channel::unbounded(),
            gate: None,
            delay: None,
        }))
    }

    pub fn unsupported(devices: Vec<AnyDevice>) -> Self {
        let mut source = Self::new(devices);
        Arc::get_mut(&mut source.0).unwrap().supported = false;
        source
    }

    /// Every poll blocks until [`release`](Self::release) is called once.
    pub fn gated(devices: Vec<AnyDevice>) -> Self {
        let mut source = Self::new(devices);
        Arc::get_mut(&mut source.0).unwrap().gate = Some(channel::unbounded());
        source
    }

    /// Every poll sleeps for `delay` before answering.
    pub fn delayed(devices: Vec<AnyDevice>, delay: Duration) -> Self {
        let mut source = Self::new(devices);
        Arc::get_mut(&mut source.0).unwrap().delay = Some(delay);
        source
    }

    pub fn set_devices(&self, devices: Vec<AnyDevice>) {
        *self.0.response.lock().unwrap() = Ok(devices);
    }

    pub fn fail(&self, message: &str) {
        *self.0.response.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    /// Wait until a poll has entered the probe.
    pub async fn wait_polled(&self) {
        self.0.polled.1.recv().await.unwrap();
    }

    pub fn release(&self) {
        let (sender, _) = self.0.gate.as_ref().expect("source is not gated");
        sender.try_send(()).unwrap();
    }
}

impl DiscoverySource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports_platform(&self) -> bool {
        self.0.supported
    }

    async fn current_devices(&self) -> eyre::Result<Snapshot> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.0.polled.0.try_send(());
        if let Some((_, gate)) = &self.0.gate {
            let _ = gate.recv().await;
        }
        if let Some(delay) = self.0.delay {
            Timer::after(delay).await;
        }
        let response = self.0.response.lock().unwrap().clone();
        response.map_err(|message| eyre::eyre!(message))
    }
}

/// Ticker driven by hand. Counts how many tick streams (timers) were created.
#[derive(Clone)]
pub struct ManualTicker {
    sender: Sender<()>,
    receiver: Receiver<()>,
    created: Arc<AtomicUsize>,
}

impl ManualTicker {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender,
            receiver,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn factory(&self) -> impl Fn() -> BoxStream<'static, ()> + Send + Sync + 'static {
        let receiver = self.receiver.clone();
        let created = Arc::clone(&self.created);
        move || {
            created.fetch_add(1, Ordering::SeqCst);
            receiver.clone().boxed()
        }
    }

    pub fn tick(&self) {
        self.sender.try_send(()).unwrap();
    }

    pub fn timers_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        Timer::after(Duration::from_millis(5)).await;
    }
}
