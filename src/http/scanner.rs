//! Response header scanner for the image download.
//!
//! Reads `\n`-terminated lines until the blank header/body boundary, keeping
//! only the status code, `Content-Length` and `Content-Type`. The body is left
//! unread in the reader for the transfer engine to stream.

use heapless::Vec as LineBuf;
use log::{debug, info, warn};
use std::io::{self, BufRead};

use crate::error::{FotaError, MalformedKind};
use crate::net::is_timeout;

/// The only payload type written to flash
pub const ACCEPTED_CONTENT_TYPE: &str = "application/octet-stream";

/// Longest header line kept in memory
pub const MAX_HEADER_LINE: usize = 512;

/// Per-attempt transfer bookkeeping. Never outlives the attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferState {
    /// 0 until a status line is seen
    pub status_code: u16,
    /// 0 when absent or unparsable
    pub content_length: usize,
    pub content_type: String,
    pub bytes_written: usize,
}

impl TransferState {
    pub fn has_valid_content_type(&self) -> bool {
        self.content_type == ACCEPTED_CONTENT_TYPE
    }

    /// Body length to stream, or why the body must not be touched
    pub fn check_preconditions(&self) -> Result<usize, FotaError> {
        match self.status_code {
            200 => {}
            0 => return Err(FotaError::MalformedResponse(MalformedKind::MissingStatusLine)),
            code => return Err(FotaError::MalformedResponse(MalformedKind::UnexpectedStatus(code))),
        }
        if self.content_length == 0 {
            return Err(FotaError::MalformedResponse(MalformedKind::NoContent));
        }
        if !self.has_valid_content_type() {
            return Err(FotaError::InvalidContentType(self.content_type.clone()));
        }
        Ok(self.content_length)
    }

    pub fn is_complete(&self) -> bool {
        self.content_length > 0 && self.bytes_written == self.content_length
    }
}

/// Scan headers up to the blank line or end of stream.
///
/// A non-200 status line stops the scan immediately. Read timeouts abort with
/// `FotaError::Timeout`; nothing is retried.
pub fn scan<R: BufRead>(reader: &mut R) -> Result<TransferState, FotaError> {
    let mut state = TransferState::default();
    let mut line: LineBuf<u8, MAX_HEADER_LINE> = LineBuf::new();

    while read_line(reader, &mut line)? {
        let text = match core::str::from_utf8(&line) {
            Ok(t) => t.trim(),
            Err(_) => {
                debug!("Skipping non UTF-8 header line");
                continue;
            }
        };

        if text.is_empty() {
            // headers ended
            break;
        }
        debug!("< {}", text);

        if text.starts_with("HTTP/") {
            state.status_code = parse_status(text);
            if state.status_code != 200 {
                warn!("Got a non 200 status code from server: {}", text);
                break;
            }
            continue;
        }

        if let Some(value) = header_value(text, "Content-Length") {
            state.content_length = value.parse().unwrap_or(0);
            info!("Got {} bytes from server", state.content_length);
        } else if let Some(value) = header_value(text, "Content-Type") {
            info!("Got {} payload", value);
            state.content_type = value.to_string();
        }
    }

    Ok(state)
}

/// Status token of `HTTP/1.1 200 OK`, 0 if unparsable
fn parse_status(line: &str) -> u16 {
    line.split_whitespace()
        .nth(1)
        .and_then(|t| t.parse().ok())
        .unwrap_or(0)
}

fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = line.split_once(':')?;
    if key.trim().eq_ignore_ascii_case(name) {
        Some(value.trim())
    } else {
        None
    }
}

/// Fill `line` with the next line minus its `\n`. Returns false once the
/// stream is exhausted and nothing was read.
fn read_line<R: BufRead, const N: usize>(
    reader: &mut R,
    line: &mut LineBuf<u8, N>,
) -> Result<bool, FotaError> {
    line.clear();
    loop {
        let (done, used) = {
            let available = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Err(FotaError::Timeout),
                Err(e) => return Err(FotaError::Connection(e)),
            };
            if available.is_empty() {
                return Ok(!line.is_empty());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    line.extend_from_slice(&available[..i])
                        .map_err(|_| FotaError::MalformedResponse(MalformedKind::HeaderTooLong))?;
                    (true, i + 1)
                }
                None => {
                    line.extend_from_slice(available)
                        .map_err(|_| FotaError::MalformedResponse(MalformedKind::HeaderTooLong))?;
                    (false, available.len())
                }
            }
        };
        reader.consume(used);
        if done {
            return Ok(true);
        }
    }
}
