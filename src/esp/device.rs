use esp_idf_sys::{
    esp_efuse_mac_get_default, esp_mac_type_t_ESP_MAC_WIFI_STA, esp_netif_get_handle_from_ifkey,
    esp_netif_get_ip_info, esp_netif_ip_info_t, esp_read_mac, ESP_OK,
};
use log::warn;

use crate::device::{chip_id_from_mac, format_mac, Device};

/// The board itself. Identity is read from eFuse on every call.
#[derive(Debug, Default)]
pub struct EspDevice;

impl EspDevice {
    pub fn new() -> Self {
        Self
    }
}

impl Device for EspDevice {
    fn chip_id(&self) -> String {
        let mut mac = [0u8; 6];
        let result = unsafe { esp_efuse_mac_get_default(mac.as_mut_ptr()) };
        if result != ESP_OK {
            warn!("esp_efuse_mac_get_default failed: {}", result);
        }
        chip_id_from_mac(&mac)
    }

    fn mac_address(&self) -> String {
        let mut mac = [0u8; 6];
        let result = unsafe { esp_read_mac(mac.as_mut_ptr(), esp_mac_type_t_ESP_MAC_WIFI_STA) };
        if result != ESP_OK {
            warn!("esp_read_mac failed: {}", result);
        }
        format_mac(&mac)
    }

    fn is_network_connected(&self) -> bool {
        // Station interface holds a DHCP lease
        unsafe {
            let mut ip_info: esp_netif_ip_info_t = std::mem::zeroed();
            let netif = esp_netif_get_handle_from_ifkey(b"WIFI_STA_DEF\0".as_ptr() as *const ::core::ffi::c_char);
            !netif.is_null()
                && esp_netif_get_ip_info(netif, &mut ip_info) == ESP_OK
                && ip_info.ip.addr != 0
        }
    }

    fn restart(&mut self) {
        esp_idf_hal::reset::restart();
    }
}
