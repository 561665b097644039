use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::device::Device;
use crate::error::FotaError;

/// Back-off after a failed check cycle before the next one
pub const CHECK_RETRY_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FotaConfig {
    // Endpoints
    pub check_url: String,
    pub track_url: String,

    // Manifest query, at most one of these
    pub use_device_id: bool,
    pub use_mac_address: bool,

    // Report completed updates to `track_url`
    pub track_updates: bool,

    // Network timing
    pub connect_timeout_ms: u32,
    pub first_byte_timeout_ms: u32,
    pub read_timeout_ms: u32,
    pub report_settle_ms: u32,
    pub check_interval_secs: u32,

    // Buffers
    pub chunk_size: usize,
    pub max_manifest_len: usize,
}

/// How one check cycle of the firmware loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    UpToDate,
    CheckFailed,
    /// An update was offered but the transfer did not complete
    TransferFailed,
}

/// Identifier appended to the manifest request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryParam {
    None,
    DeviceId,
    MacAddress,
}

/// Timing and buffer settings for one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    pub connect_timeout: Duration,
    pub first_byte_timeout: Duration,
    pub read_timeout: Duration,
    pub chunk_size: usize,
}

impl Default for FotaConfig {
    fn default() -> Self {
        Self {
            check_url: String::new(),
            track_url: String::new(),
            use_device_id: false,
            use_mac_address: false,
            track_updates: false,
            connect_timeout_ms: 5000,
            first_byte_timeout_ms: 5000,
            read_timeout_ms: 5000,
            report_settle_ms: 2000,
            check_interval_secs: 3600,
            chunk_size: 1024,
            max_manifest_len: 2048,
        }
    }
}

impl FotaConfig {
    pub fn validate(&self) -> Result<(), FotaError> {
        if self.use_device_id && self.use_mac_address {
            return Err(FotaError::InvalidConfig(
                "use_device_id and use_mac_address are mutually exclusive",
            ));
        }
        if self.track_updates && self.track_url.is_empty() {
            return Err(FotaError::InvalidConfig("track_updates requires track_url"));
        }
        if self.connect_timeout_ms == 0 || self.first_byte_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(FotaError::InvalidConfig("timeouts must be non-zero"));
        }
        if self.chunk_size == 0 {
            return Err(FotaError::InvalidConfig("chunk_size must be non-zero"));
        }
        Ok(())
    }

    pub fn query_param(&self) -> QueryParam {
        if self.use_device_id {
            QueryParam::DeviceId
        } else if self.use_mac_address {
            QueryParam::MacAddress
        } else {
            QueryParam::None
        }
    }

    /// Manifest URL for this device, identity read from hardware on demand
    pub fn manifest_url<D: Device>(&self, device: &D) -> String {
        let (key, value) = match self.query_param() {
            QueryParam::None => return self.check_url.clone(),
            QueryParam::DeviceId => ("device_id", device.chip_id()),
            QueryParam::MacAddress => ("mac_address", device.mac_address()),
        };
        let sep = if self.check_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}={}", self.check_url, sep, key, value)
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms as u64),
            first_byte_timeout: Duration::from_millis(self.first_byte_timeout_ms as u64),
            read_timeout: Duration::from_millis(self.read_timeout_ms as u64),
            chunk_size: self.chunk_size,
        }
    }

    pub fn report_settle(&self) -> Duration {
        Duration::from_millis(self.report_settle_ms as u64)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs as u64)
    }

    /// Wait before the next cycle. Only a failed check is retried quickly;
    /// a failed transfer waits the full interval so a bad image is not
    /// downloaded over and over.
    pub fn next_check_in(&self, outcome: CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::CheckFailed => CHECK_RETRY_BACKOFF,
            CycleOutcome::UpToDate | CycleOutcome::TransferFailed => self.check_interval(),
        }
    }
}
