use std::fmt;
use std::io;

/// Why a response was rejected before any body byte was consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    MissingStatusLine,
    UnexpectedStatus(u16),
    NoContent,
    HeaderTooLong,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedKind::MissingStatusLine => write!(f, "no status line"),
            MalformedKind::UnexpectedStatus(code) => write!(f, "non 200 status code {}", code),
            MalformedKind::NoContent => write!(f, "no content in the response"),
            MalformedKind::HeaderTooLong => write!(f, "header line too long"),
        }
    }
}

#[derive(Debug)]
pub enum FotaError {
    Connection(io::Error),
    Timeout,
    MalformedResponse(MalformedKind),
    InvalidContentType(String),
    InsufficientStorage { required: usize },
    ShortWrite { written: usize, expected: usize },
    DigestMismatch { expected: String, actual: String },
    FinalizeFailure { code: i32 },
    IncompleteAfterFinalize,
    NetworkUnavailable,
    JsonParse(String),
    HttpStatus(u16),
    Transport(String),
    NoTarget,
    InvalidConfig(&'static str),
}

impl fmt::Display for FotaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FotaError::Connection(e) => write!(f, "connection failed: {}", e),
            FotaError::Timeout => write!(f, "client timeout"),
            FotaError::MalformedResponse(kind) => write!(f, "malformed response: {}", kind),
            FotaError::InvalidContentType(t) => write!(f, "invalid content type '{}'", t),
            FotaError::InsufficientStorage { required } => {
                write!(f, "not enough space to begin OTA ({} bytes)", required)
            }
            FotaError::ShortWrite { written, expected } => {
                write!(f, "written only {}/{} bytes", written, expected)
            }
            FotaError::DigestMismatch { expected, actual } => {
                write!(f, "sha256 mismatch: expected {}, got {}", expected, actual)
            }
            FotaError::FinalizeFailure { code } => write!(f, "finalize failed, error #{}", code),
            FotaError::IncompleteAfterFinalize => {
                write!(f, "update not finished after finalize, something went wrong")
            }
            FotaError::NetworkUnavailable => write!(f, "network not connected"),
            FotaError::JsonParse(e) => write!(f, "JSON error: {}", e),
            FotaError::HttpStatus(code) => write!(f, "HTTP {}", code),
            FotaError::Transport(e) => write!(f, "HTTP transport error: {}", e),
            FotaError::NoTarget => write!(f, "no update target selected"),
            FotaError::InvalidConfig(why) => write!(f, "invalid configuration: {}", why),
        }
    }
}

impl std::error::Error for FotaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FotaError::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FotaError {
    fn from(value: serde_json::Error) -> Self {
        FotaError::JsonParse(value.to_string())
    }
}
