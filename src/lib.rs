//! `WaterUI` device discovery library
//!
//! This crate answers three questions for the `water` toolchain: which devices are reachable
//! right now, which single device an operation should target, and when devices appear or
//! disappear.
//!
//! # Architecture
//!
//! Data flows leaves first:
//!
//! - **[`DiscoverySource`](discovery::DiscoverySource)** - probes one platform family on demand
//! - **[`diff`](diff::diff)** - computes added/removed devices between two snapshots
//! - **[`PollingDiscoveryEngine`](engine::PollingDiscoveryEngine)** - polls a source on a timer
//!   and publishes changes exactly once per transition
//! - **[`DeviceRegistry`](registry::DeviceRegistry)** - aggregates engines and applies the
//!   user's device filter
//! - **[`DeviceSelector`](selector::DeviceSelector)** - picks at most one device per platform
//!
//! Concrete sources for Android, iOS devices, iOS simulators and the host machine live in
//! [`android`], [`apple`] and [`host`]. The terminal frontend lives in `src/terminal/`.

pub mod android;
pub mod apple;
pub mod config;
pub mod device;
pub mod diff;
pub mod discovery;
pub mod engine;
pub mod host;
pub mod log_reader;
pub mod output;
pub mod registry;
pub mod selector;
pub mod toolchain;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use device::{AnyDevice, ApplicationPackage, Device, DeviceError, Platform, StartOptions};
pub use diff::ChangeSet;
pub use discovery::{DeviceDiscovery, DiscoverySource, Snapshot};
pub use engine::PollingDiscoveryEngine;
pub use log_reader::{AnyLogReader, DeviceLogReader, LogSource, LogStream};
pub use registry::{DeviceChange, DeviceRegistry};
pub use selector::{
    Advisory, BuildConfiguration, DeviceSelector, Selection, SelectionError, SelectionInput,
    SelectionResult,
};
pub use toolchain::Toolchain;
