use anyhow::Result;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};
use esp_idf_sys as _; // Binstart
use log::{error, info, warn};
use std::thread;
use std::time::Duration;

use esp_fota::config::CHECK_RETRY_BACKOFF;
use esp_fota::esp::config_store::ConfigStore;
use esp_fota::esp::wifi::{WIFI_PASSWORD, WIFI_SSID};
use esp_fota::esp::{EspDevice, EspFlashSink, EspHttpClient, WifiManager};
use esp_fota::net::TcpConnector;
use esp_fota::{logging, version, CycleOutcome, Fota};

// ESP-IDF app descriptor
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    logging::init_logger().map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    info!("{}", version::version_info());
    info!("Free heap: {} bytes", unsafe {
        esp_idf_sys::esp_get_free_heap_size()
    });

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let mut store = ConfigStore::new(nvs.clone())?;
    let config = store.load_or_default();

    let mut wifi = WifiManager::new(peripherals.modem, sys_loop, nvs, WIFI_SSID, WIFI_PASSWORD)?;
    wifi.connect()?;

    let http = EspHttpClient::new(Duration::from_millis(config.read_timeout_ms as u64));
    let sink = EspFlashSink::new().map_err(|e| anyhow::anyhow!("OTA unavailable: {}", e))?;

    let mut fota = Fota::new(
        version::running_identity(),
        config,
        http,
        TcpConnector,
        sink,
        EspDevice::new(),
    )?;

    loop {
        if !wifi.is_connected() {
            warn!("WiFi down, reconnecting");
            if let Err(e) = wifi.connect() {
                error!("WiFi reconnect failed: {:?}", e);
                thread::sleep(CHECK_RETRY_BACKOFF);
                continue;
            }
        }

        let outcome = match fota.try_check() {
            Ok(Some(_)) => {
                // returns only if the attempt failed
                fota.execute_transfer();
                CycleOutcome::TransferFailed
            }
            Ok(None) => CycleOutcome::UpToDate,
            Err(e) => {
                warn!("Update check failed: {}", e);
                CycleOutcome::CheckFailed
            }
        };
        thread::sleep(fota.config().next_check_in(outcome));
    }
}
