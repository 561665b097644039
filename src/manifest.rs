//! Update manifest and the version/type decision gate.
//!
//! The manifest endpoint answers with a JSON array of candidate images:
//!
//! ```json
//! [{"type": "app", "version": 5, "host": "fw.local", "port": 80, "bin": "/app-5.bin"}]
//! ```
//!
//! Only the first entry is ever decoded and evaluated. Servers publish one
//! entry per firmware type and device, so a second entry is never considered
//! even if it would qualify, and a malformed one is never noticed.

use serde::Deserialize;

use crate::error::FotaError;
use crate::version::FirmwareIdentity;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateCandidate {
    #[serde(rename = "type")]
    pub firmware_type: String,
    pub version: u32,
    pub host: String,
    pub port: u16,
    #[serde(rename = "bin")]
    pub path: String,
    /// Hex SHA-256 of the image, optional
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Where the transfer engine fetches the image from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub sha256: Option<String>,
}

impl UpdateTarget {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
            sha256: None,
        }
    }
}

impl UpdateCandidate {
    /// Same firmware type and a strictly greater version
    pub fn supersedes(&self, running: &FirmwareIdentity) -> bool {
        self.version > running.version() && self.firmware_type == running.firmware_type()
    }

    pub fn target(&self) -> UpdateTarget {
        UpdateTarget {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            sha256: self.sha256.as_ref().map(|s| s.to_ascii_lowercase()),
        }
    }
}

/// First manifest entry, `None` for an empty array. The body must be a JSON
/// array; entries after the first are not decoded.
pub fn first_candidate(body: &[u8]) -> Result<Option<UpdateCandidate>, FotaError> {
    let entries: Vec<serde_json::Value> = serde_json::from_slice(body)?;
    match entries.into_iter().next() {
        Some(first) => Ok(Some(serde_json::from_value(first)?)),
        None => Ok(None),
    }
}

/// Decision gate over the first manifest entry
pub fn select(first: Option<&UpdateCandidate>, running: &FirmwareIdentity) -> Option<UpdateTarget> {
    let first = first?;
    if first.supersedes(running) {
        Some(first.target())
    } else {
        log::info!(
            "No update: manifest offers {} v{}, running {}",
            first.firmware_type,
            first.version,
            running
        );
        None
    }
}
