//! esp-fota - pull-based firmware updates for network-connected ESP devices
//!
//! The device asks a manifest endpoint whether a newer image exists for its
//! firmware type, streams the image straight from a plain HTTP socket into the
//! OTA partition, verifies the byte count and restarts into it.
//!
//! Everything outside `esp` is hardware-independent and runs on the host.

pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod logging;
pub mod manifest;
pub mod net;
pub mod ota;
pub mod sink;
pub mod version;

#[cfg(target_os = "espidf")]
pub mod esp;

#[cfg(test)]
mod testing;

pub use config::{CycleOutcome, FotaConfig, QueryParam};
pub use device::{Device, DeviceIdentity};
pub use error::{FotaError, MalformedKind};
pub use manifest::{UpdateCandidate, UpdateTarget};
pub use ota::{Fota, TransferEngine, TransferPhase};
pub use sink::{FlashSink, MemorySink, SinkError};
pub use version::FirmwareIdentity;
