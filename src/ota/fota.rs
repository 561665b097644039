//! Top-level updater.
//!
//! Owns the running firmware identity, the configuration and the platform
//! services for its whole lifetime. Check, transfer and report are single
//! synchronous attempts; retrying is the caller's decision.

use log::{error, info, warn};
use std::thread;

use crate::config::FotaConfig;
use crate::device::Device;
use crate::error::FotaError;
use crate::http::HttpClient;
use crate::manifest::{self, UpdateTarget};
use crate::net::Connector;
use crate::ota::engine::{TransferEngine, TransferPhase};
use crate::ota::reporter;
use crate::sink::FlashSink;
use crate::version::FirmwareIdentity;

pub struct Fota<H, C, S, D> {
    firmware: FirmwareIdentity,
    config: FotaConfig,
    http: H,
    connector: C,
    sink: S,
    device: D,
    target: Option<UpdateTarget>,
    last_phase: Option<TransferPhase>,
}

impl<H, C, S, D> Fota<H, C, S, D>
where
    H: HttpClient,
    C: Connector,
    S: FlashSink,
    D: Device,
{
    pub fn new(
        firmware: FirmwareIdentity,
        config: FotaConfig,
        http: H,
        connector: C,
        sink: S,
        device: D,
    ) -> Result<Self, FotaError> {
        config.validate()?;
        Ok(Self {
            firmware,
            config,
            http,
            connector,
            sink,
            device,
            target: None,
            last_phase: None,
        })
    }

    pub fn firmware(&self) -> &FirmwareIdentity {
        &self.firmware
    }

    pub fn config(&self) -> &FotaConfig {
        &self.config
    }

    /// Image selected by the last check or set by `force_transfer`
    pub fn target(&self) -> Option<&UpdateTarget> {
        self.target.as_ref()
    }

    /// Phase the last transfer attempt reached
    pub fn last_phase(&self) -> Option<TransferPhase> {
        self.last_phase
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Ask the manifest endpoint whether a newer image exists.
    /// On failure the caller should wait `CHECK_RETRY_BACKOFF` before asking again.
    pub fn check_for_update(&mut self) -> bool {
        match self.try_check() {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!("Update check failed: {}", e);
                false
            }
        }
    }

    pub fn try_check(&mut self) -> Result<Option<UpdateTarget>, FotaError> {
        self.target = None;

        if self.config.check_url.is_empty() {
            return Err(FotaError::InvalidConfig("check_url is not set"));
        }
        if !self.device.is_network_connected() {
            return Err(FotaError::NetworkUnavailable);
        }

        let url = self.config.manifest_url(&self.device);
        info!("Checking for updates: {}", url);
        let response = self.http.get(&url, self.config.max_manifest_len)?;
        if response.status != 200 {
            return Err(FotaError::HttpStatus(response.status));
        }

        let first = manifest::first_candidate(&response.body)?;
        let target = manifest::select(first.as_ref(), &self.firmware);
        if let Some(t) = &target {
            info!("New firmware available at {}:{}{}", t.host, t.port, t.path);
        }
        self.target = target.clone();
        Ok(target)
    }

    /// Run one transfer attempt against the current target. Failures are
    /// logged; on success the device restarts and this never returns.
    pub fn execute_transfer(&mut self) {
        if let Err(e) = self.try_transfer() {
            error!("OTA update failed: {}", e);
        }
    }

    /// Like `execute_transfer`, but hands back the outcome. `Ok` means the
    /// restart was requested.
    pub fn try_transfer(&mut self) -> Result<(), FotaError> {
        let target = self.target.clone().ok_or(FotaError::NoTarget)?;
        let mut engine = TransferEngine::new(self.config.transfer_settings());

        let result = engine.run(&mut self.connector, &mut self.sink, &target);
        self.last_phase = engine.phase();
        let state = result?;
        info!("Written: {} successfully", state.bytes_written);

        engine.enter(TransferPhase::PostProcessing);
        self.last_phase = engine.phase();
        if self.config.track_updates {
            self.report_success();
            thread::sleep(self.config.report_settle());
        } else {
            info!("Don't track updated device opted");
        }

        if !self.sink.is_complete() {
            self.sink.abort();
            return Err(FotaError::IncompleteAfterFinalize);
        }

        engine.enter(TransferPhase::Rebooting);
        self.last_phase = engine.phase();
        info!("Update successfully completed. Rebooting.");
        self.device.restart();
        Ok(())
    }

    /// Transfer from an explicit location, skipping the manifest and the
    /// version gate. Returns true once the attempt ran, whatever its outcome;
    /// use `try_transfer` when the outcome matters.
    pub fn force_transfer(&mut self, host: &str, port: u16, path: &str) -> bool {
        self.target = Some(UpdateTarget::new(host, port, path));
        self.execute_transfer();
        true
    }

    /// POST the success record to the tracking endpoint; logged, never fatal
    pub fn report_success(&mut self) {
        match reporter::report(
            &mut self.http,
            &self.device,
            &self.firmware,
            &self.config.track_url,
        ) {
            Ok(status) => info!("Tracked updated device, HTTP {}", status),
            Err(FotaError::NetworkUnavailable) => {
                warn!("Wi-Fi not connected, check connectivity! Update not tracked")
            }
            Err(e) => warn!("Error tracking, check your POST endpoint: {}", e),
        }
    }
}
