/// Hardware services the updater needs from the board
pub trait Device {
    /// Factory chip id, decimal
    fn chip_id(&self) -> String;

    /// Station MAC, `AA:BB:CC:DD:EE:FF`
    fn mac_address(&self) -> String;

    fn is_network_connected(&self) -> bool;

    /// Restart into the freshly committed image. Does not return on hardware.
    fn restart(&mut self);

    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            chip_id: self.chip_id(),
            mac_address: self.mac_address(),
        }
    }
}

/// Derived on demand, never cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub chip_id: String,
    pub mac_address: String,
}

pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// 48-bit factory MAC read big-endian, printed in decimal
pub fn chip_id_from_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64)
        .to_string()
}
