//! Desktop client for an update server. Runs the same check and transfer
//! cycle a device runs, writing the image to a file instead of flash.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use esp_fota::http::{HttpClient, HttpResponse};
use esp_fota::net::TcpConnector;
use esp_fota::{Device, FirmwareIdentity, FlashSink, Fota, FotaConfig, FotaError, SinkError};

#[derive(Parser)]
#[command(name = "fota")]
#[command(about = "ESP FOTA update server client", long_about = None)]
struct Cli {
    /// Firmware type to ask for
    #[arg(short = 't', long = "type", default_value = "esp-fota")]
    firmware_type: String,

    /// Version the pretend device is running
    #[arg(short, long, default_value = "0")]
    version: u32,

    /// MAC address the pretend device reports
    #[arg(long, default_value = "24:0A:C4:00:00:01")]
    mac: String,

    /// Log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask the manifest endpoint whether an update exists
    Check {
        url: String,
        /// Append device_id to the manifest request
        #[arg(long)]
        device_id: bool,
        /// Append mac_address to the manifest request
        #[arg(long)]
        mac_address: bool,
    },
    /// Check, then download the offered image
    Pull {
        url: String,
        #[arg(short, long, default_value = "firmware.bin")]
        output: PathBuf,
        /// Report the download to this tracking endpoint
        #[arg(long)]
        track: Option<String>,
    },
    /// Download an image from an explicit location
    Force {
        host: String,
        path: String,
        #[arg(short, long, default_value = "80")]
        port: u16,
        #[arg(short, long, default_value = "firmware.bin")]
        output: PathBuf,
    },
}

struct ReqwestHttp {
    client: reqwest::blocking::Client,
}

impl ReqwestHttp {
    fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestHttp {
    fn get(&mut self, url: &str, max_body: usize) -> Result<HttpResponse, FotaError> {
        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(transport)?;
        if body.len() > max_body {
            return Err(FotaError::Transport(format!(
                "response body exceeds {} bytes",
                max_body
            )));
        }
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, FotaError> {
        let mut request = self.client.post(url).body(body.to_vec());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().map_err(transport)?;
        Ok(HttpResponse {
            status: response.status().as_u16(),
            body: Vec::new(),
        })
    }
}

fn transport(e: reqwest::Error) -> FotaError {
    FotaError::Transport(e.to_string())
}

/// Buffers the image and writes the file on finalize
struct FileSink {
    path: PathBuf,
    buffer: Vec<u8>,
    expected: Option<usize>,
    progress: Option<ProgressBar>,
    complete: bool,
    last_error: i32,
}

impl FileSink {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            buffer: Vec::new(),
            expected: None,
            progress: None,
            complete: false,
            last_error: 0,
        }
    }
}

impl FlashSink for FileSink {
    fn reserve(&mut self, size: usize) -> Result<(), SinkError> {
        let pb = ProgressBar::new(size as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        self.buffer = Vec::with_capacity(size);
        self.expected = Some(size);
        self.progress = Some(pb);
        self.complete = false;
        Ok(())
    }

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if self.expected.is_none() {
            return Err(SinkError::NotStarted);
        }
        self.buffer.extend_from_slice(data);
        if let Some(pb) = &self.progress {
            pb.inc(data.len() as u64);
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        if let Some(pb) = self.progress.take() {
            pb.finish_and_clear();
        }
        if self.expected.take() != Some(self.buffer.len()) {
            self.last_error = esp_fota::sink::ERR_SIZE_MISMATCH;
            return Err(SinkError::ValidationFailed(self.last_error));
        }
        if let Err(e) = fs::write(&self.path, &self.buffer) {
            eprintln!("{} Failed to write {}: {}", "❌".red(), self.path.display(), e);
            self.last_error = e.raw_os_error().unwrap_or(-1);
            return Err(SinkError::WriteFailed(self.last_error));
        }
        self.complete = true;
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn last_error_code(&self) -> i32 {
        self.last_error
    }

    fn abort(&mut self) {
        if let Some(pb) = self.progress.take() {
            pb.abandon();
        }
        self.expected = None;
        self.buffer.clear();
    }
}

struct HostDevice {
    mac: String,
    restarted: bool,
}

impl Device for HostDevice {
    fn chip_id(&self) -> String {
        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(self.mac.split(':')) {
            *slot = u8::from_str_radix(part, 16).unwrap_or(0);
        }
        esp_fota::device::chip_id_from_mac(&bytes)
    }

    fn mac_address(&self) -> String {
        self.mac.clone()
    }

    fn is_network_connected(&self) -> bool {
        true
    }

    fn restart(&mut self) {
        self.restarted = true;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    esp_fota::logging::init_logger().map_err(|e| anyhow::anyhow!("logger: {}", e))?;
    if !esp_fota::logging::set_max_level_from_str(&cli.log_level) {
        bail!("unknown log level '{}'", cli.log_level);
    }
    let firmware = FirmwareIdentity::new(cli.firmware_type.clone(), cli.version);
    let device = HostDevice {
        mac: cli.mac.to_uppercase(),
        restarted: false,
    };

    let (config, output) = match &cli.command {
        Command::Check { url, device_id, mac_address } => (
            FotaConfig {
                check_url: url.clone(),
                use_device_id: *device_id,
                use_mac_address: *mac_address,
                ..Default::default()
            },
            PathBuf::from("firmware.bin"),
        ),
        Command::Pull { url, output, track } => (
            FotaConfig {
                check_url: url.clone(),
                track_url: track.clone().unwrap_or_default(),
                track_updates: track.is_some(),
                report_settle_ms: 0,
                ..Default::default()
            },
            output.clone(),
        ),
        Command::Force { output, .. } => (FotaConfig::default(), output.clone()),
    };

    println!("{} ESP FOTA client", "🚀".blue());
    println!("{}Running: {}", "   ".dimmed(), firmware);

    let mut fota = Fota::new(
        firmware,
        config,
        ReqwestHttp::new()?,
        TcpConnector,
        FileSink::new(output.clone()),
        device,
    )
    .context("invalid options")?;

    match &cli.command {
        Command::Check { .. } => {
            match fota.try_check()? {
                Some(target) => println!(
                    "{} Update available: {}:{}{}",
                    "✨".green(),
                    target.host,
                    target.port,
                    target.path
                ),
                None => println!("{} Up to date", "✅".green()),
            }
            return Ok(());
        }
        Command::Pull { .. } => {
            if fota.try_check()?.is_none() {
                println!("{} Up to date", "✅".green());
                return Ok(());
            }
            fota.try_transfer()?;
        }
        Command::Force { host, path, port, .. } => {
            fota.force_transfer(host, *port, path);
        }
    }

    if !fota.device().restarted {
        bail!("download failed during {:?}", fota.last_phase());
    }
    println!("{} Image written to {}", "✅".green(), output.display());
    Ok(())
}
