// Running firmware identity

use std::fmt;

/// Firmware type reported to the manifest server, fixed at build time
pub const FIRMWARE_TYPE: &str = env!("FOTA_FIRMWARE_TYPE");

// Cargo package version from Cargo.toml
pub const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Integer firmware version compared against manifest entries.
/// A malformed `FOTA_FIRMWARE_VERSION` fails the build.
pub const FIRMWARE_VERSION: u32 = parse_version(env!("FOTA_FIRMWARE_VERSION"));

pub fn firmware_version() -> u32 {
    FIRMWARE_VERSION
}

/// Decimal digits only, no sign, fits `u32`
pub const fn parse_version(text: &str) -> u32 {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        panic!("firmware version is empty");
    }
    let mut value: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if !b.is_ascii_digit() {
            panic!("firmware version must be a plain integer");
        }
        value = match value.checked_mul(10) {
            Some(v) => match v.checked_add((b - b'0') as u32) {
                Some(v) => v,
                None => panic!("firmware version overflows u32"),
            },
            None => panic!("firmware version overflows u32"),
        };
        i += 1;
    }
    value
}

/// Identity of the image this build produces
pub fn running_identity() -> FirmwareIdentity {
    FirmwareIdentity::new(FIRMWARE_TYPE, firmware_version())
}

// Version info string for logging
pub fn version_info() -> String {
    format!("{} v{} (Cargo: {})", FIRMWARE_TYPE, firmware_version(), CARGO_VERSION)
}

/// Type and version of the currently running firmware. Set once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareIdentity {
    firmware_type: String,
    version: u32,
}

impl FirmwareIdentity {
    pub fn new(firmware_type: impl Into<String>, version: u32) -> Self {
        Self {
            firmware_type: firmware_type.into(),
            version,
        }
    }

    pub fn firmware_type(&self) -> &str {
        &self.firmware_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl fmt::Display for FirmwareIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.firmware_type, self.version)
    }
}
