// Update reporter - tells the tracking endpoint a device took an update

use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceIdentity};
use crate::error::FotaError;
use crate::http::HttpClient;
use crate::version::FirmwareIdentity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingPayload {
    #[serde(rename = "type")]
    pub firmware_type: String,
    pub version: u32,
    /// Chip id
    pub hardware_id: String,
    /// MAC address
    pub device_id: String,
}

impl TrackingPayload {
    pub fn new(firmware: &FirmwareIdentity, device: &DeviceIdentity) -> Self {
        Self {
            firmware_type: firmware.firmware_type().to_string(),
            version: firmware.version(),
            hardware_id: device.chip_id.clone(),
            device_id: device.mac_address.clone(),
        }
    }
}

/// POST the tracking record. Any 2xx is success; the committed update is
/// never affected by the outcome.
pub fn report<H: HttpClient, D: Device>(
    http: &mut H,
    device: &D,
    firmware: &FirmwareIdentity,
    url: &str,
) -> Result<u16, FotaError> {
    if !device.is_network_connected() {
        return Err(FotaError::NetworkUnavailable);
    }

    let payload = TrackingPayload::new(firmware, &device.identity());
    let body = serde_json::to_vec(&payload)?;
    let response = http.post(url, &[("Content-Type", "application/json")], &body)?;

    if response.is_success() {
        Ok(response.status)
    } else {
        Err(FotaError::HttpStatus(response.status))
    }
}
