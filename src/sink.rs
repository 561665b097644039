// Flash update sink - where the streamed image ends up

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// No partition to write the update into
    Unavailable,
    /// Image does not fit the update region
    InvalidSize(usize),
    BeginFailed(i32),
    WriteFailed(i32),
    ValidationFailed(i32),
    BootPartitionFailed(i32),
    NotStarted,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Unavailable => write!(f, "no update partition"),
            SinkError::InvalidSize(size) => write!(f, "image of {} bytes does not fit", size),
            SinkError::BeginFailed(code) => write!(f, "begin failed ({})", code),
            SinkError::WriteFailed(code) => write!(f, "write failed ({})", code),
            SinkError::ValidationFailed(code) => write!(f, "image validation failed ({})", code),
            SinkError::BootPartitionFailed(code) => write!(f, "set boot partition failed ({})", code),
            SinkError::NotStarted => write!(f, "no update in progress"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Single, process-wide exclusive update region.
///
/// Call order: `reserve`, `write_chunk`*, then `finalize` or `abort`.
pub trait FlashSink {
    /// Reserve room for an image of `size` bytes
    fn reserve(&mut self, size: usize) -> Result<(), SinkError>;

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Validate and commit the written image
    fn finalize(&mut self) -> Result<(), SinkError>;

    /// Committed image will be booted next
    fn is_complete(&self) -> bool;

    /// Raw platform error code of the last failure, 0 if none
    fn last_error_code(&self) -> i32;

    /// Drop an in-progress reservation; the running image is untouched
    fn abort(&mut self);
}

pub const ERR_NO_SPACE: i32 = -1;
pub const ERR_NOT_STARTED: i32 = -2;
pub const ERR_SIZE_MISMATCH: i32 = -3;

/// RAM-backed sink with a fixed capacity
#[derive(Debug, Default)]
pub struct MemorySink {
    capacity: usize,
    reserved: Option<usize>,
    data: Vec<u8>,
    committed: bool,
    finalize_attempts: usize,
    last_error: i32,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn reserved(&self) -> Option<usize> {
        self.reserved
    }

    pub fn finalize_attempts(&self) -> usize {
        self.finalize_attempts
    }

    fn fail(&mut self, err: SinkError, code: i32) -> Result<(), SinkError> {
        self.last_error = code;
        Err(err)
    }
}

impl FlashSink for MemorySink {
    fn reserve(&mut self, size: usize) -> Result<(), SinkError> {
        if size == 0 || size > self.capacity {
            return self.fail(SinkError::InvalidSize(size), ERR_NO_SPACE);
        }
        self.reserved = Some(size);
        self.data.clear();
        self.committed = false;
        Ok(())
    }

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), SinkError> {
        match self.reserved {
            Some(size) if self.data.len() + data.len() <= size => {
                self.data.extend_from_slice(data);
                Ok(())
            }
            Some(_) => self.fail(SinkError::WriteFailed(ERR_NO_SPACE), ERR_NO_SPACE),
            None => self.fail(SinkError::NotStarted, ERR_NOT_STARTED),
        }
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        self.finalize_attempts += 1;
        match self.reserved {
            Some(size) if size == self.data.len() => {
                self.committed = true;
                Ok(())
            }
            Some(_) => self.fail(SinkError::ValidationFailed(ERR_SIZE_MISMATCH), ERR_SIZE_MISMATCH),
            None => self.fail(SinkError::NotStarted, ERR_NOT_STARTED),
        }
    }

    fn is_complete(&self) -> bool {
        self.committed && self.reserved == Some(self.data.len())
    }

    fn last_error_code(&self) -> i32 {
        self.last_error
    }

    fn abort(&mut self) {
        self.reserved = None;
        self.data.clear();
        self.committed = false;
    }
}
