// Persisted updater settings, JSON blob in NVS

use anyhow::Result;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

use crate::config::FotaConfig;

const CONFIG_NAMESPACE: &str = "fota";
const CONFIG_KEY: &str = "config";

pub struct ConfigStore {
    nvs: EspNvs<NvsDefault>,
}

impl ConfigStore {
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self> {
        let nvs = EspNvs::new(partition, CONFIG_NAMESPACE, true)?;
        Ok(Self { nvs })
    }

    /// Stored config, or the compiled-in endpoints when nothing usable is stored
    pub fn load_or_default(&mut self) -> FotaConfig {
        match self.load() {
            Ok(mut config) => {
                log::info!("Loaded configuration from NVS");
                if config.check_url.is_empty() {
                    let defaults = compiled_defaults();
                    log::warn!("NVS check_url empty, using compiled default '{}'", defaults.check_url);
                    config.check_url = defaults.check_url;
                    if config.track_url.is_empty() {
                        config.track_url = defaults.track_url;
                    }
                    if let Err(e) = self.save(&config) {
                        log::warn!("Failed to save updated config: {:?}", e);
                    }
                }
                config
            }
            Err(e) => {
                log::warn!("Failed to load config from NVS: {:?}, using defaults", e);
                let config = compiled_defaults();
                if let Err(save_err) = self.save(&config) {
                    log::warn!("Failed to save default config to NVS: {:?}", save_err);
                }
                config
            }
        }
    }

    pub fn load(&self) -> Result<FotaConfig> {
        let mut buf = vec![0u8; 2048];
        let data = self
            .nvs
            .get_blob(CONFIG_KEY, &mut buf)?
            .ok_or_else(|| anyhow::anyhow!("Config not found in NVS"))?;
        Ok(serde_json::from_slice(data)?)
    }

    pub fn save(&mut self, config: &FotaConfig) -> Result<()> {
        let json = serde_json::to_vec(config)?;
        self.nvs.set_blob(CONFIG_KEY, &json)?;
        log::info!("Configuration saved to NVS");
        Ok(())
    }
}

fn compiled_defaults() -> FotaConfig {
    let track_url = env!("FOTA_TRACK_URL");
    FotaConfig {
        check_url: env!("FOTA_CHECK_URL").to_string(),
        track_url: track_url.to_string(),
        track_updates: !track_url.is_empty(),
        ..Default::default()
    }
}
