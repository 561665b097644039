// Transfer engine - socket to flash, one attempt, no retries

use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use std::io::{self, BufReader, Read, Write};

use crate::config::TransferSettings;
use crate::error::FotaError;
use crate::http::{request, scanner, TransferState};
use crate::manifest::UpdateTarget;
use crate::net::{is_timeout, Connection, Connector};
use crate::sink::FlashSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Connecting,
    AwaitingHeaders,
    ParsingHeaders,
    ValidatingPreconditions,
    Streaming,
    Verifying,
    Finalizing,
    PostProcessing,
    Rebooting,
}

pub struct TransferEngine {
    settings: TransferSettings,
    phase: Option<TransferPhase>,
}

impl TransferEngine {
    pub fn new(settings: TransferSettings) -> Self {
        Self {
            settings,
            phase: None,
        }
    }

    /// Last phase entered; where a failed attempt stopped
    pub fn phase(&self) -> Option<TransferPhase> {
        self.phase
    }

    pub(crate) fn enter(&mut self, phase: TransferPhase) {
        debug!("OTA phase: {:?}", phase);
        self.phase = Some(phase);
    }

    /// Fetch `target` and commit it to `sink`.
    ///
    /// Returns once the sink accepted `finalize`. Every error leaves the
    /// running image in place and releases any reservation.
    pub fn run<C, S>(
        &mut self,
        connector: &mut C,
        sink: &mut S,
        target: &UpdateTarget,
    ) -> Result<TransferState, FotaError>
    where
        C: Connector,
        S: FlashSink,
    {
        self.enter(TransferPhase::Connecting);
        info!("Connecting to: {}:{}", target.host, target.port);
        let mut conn = connector
            .connect(&target.host, target.port, self.settings.connect_timeout)
            .map_err(|e| {
                error!("Connection to {} failed. Please check your setup", target.host);
                FotaError::Connection(e)
            })?;

        self.enter(TransferPhase::AwaitingHeaders);
        info!("Fetching bin: {}", target.path);
        conn.write_all(request::build_get(target).as_bytes())
            .and_then(|_| conn.flush())
            .map_err(FotaError::Connection)?;

        if !conn
            .wait_for_data(self.settings.first_byte_timeout)
            .map_err(FotaError::Connection)?
        {
            // dropping the connection closes it
            return Err(FotaError::Timeout);
        }
        conn.set_io_timeout(self.settings.read_timeout)
            .map_err(FotaError::Connection)?;

        self.enter(TransferPhase::ParsingHeaders);
        let mut reader = BufReader::with_capacity(self.settings.chunk_size, conn);
        let mut state = scanner::scan(&mut reader)?;

        self.enter(TransferPhase::ValidatingPreconditions);
        info!(
            "contentLength: {}, isValidContentType: {}",
            state.content_length,
            state.has_valid_content_type()
        );
        // on failure the unread remainder is discarded with the connection
        let expected = state.check_preconditions()?;

        self.enter(TransferPhase::Streaming);
        sink.reserve(expected).map_err(|e| {
            error!("Not enough space to begin OTA: {}", e);
            FotaError::InsufficientStorage { required: expected }
        })?;
        info!("Begin OTA, {} bytes. This may take a while", expected);
        let (written, digest) = stream_body(&mut reader, sink, expected, self.settings.chunk_size);
        state.bytes_written = written;

        self.enter(TransferPhase::Verifying);
        if !state.is_complete() {
            sink.abort();
            return Err(FotaError::ShortWrite { written, expected });
        }
        info!("Written: {} bytes, sha256 {}", written, digest);
        if let Some(published) = &target.sha256 {
            if *published != digest {
                sink.abort();
                return Err(FotaError::DigestMismatch {
                    expected: published.clone(),
                    actual: digest,
                });
            }
        }

        self.enter(TransferPhase::Finalizing);
        if let Err(e) = sink.finalize() {
            let code = sink.last_error_code();
            error!("Finalize rejected the image: {}, error #{}", e, code);
            sink.abort();
            return Err(FotaError::FinalizeFailure { code });
        }
        info!("OTA done!");

        Ok(state)
    }
}

/// Copy at most `expected` body bytes into the sink. Stops early on end of
/// stream, read timeout or a rejected write. Returns bytes written and the
/// hex SHA-256 of them.
fn stream_body<R: Read, S: FlashSink>(
    reader: &mut R,
    sink: &mut S,
    expected: usize,
    chunk_size: usize,
) -> (usize, String) {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size];
    let mut written = 0;
    let mut last_step = 0;

    while written < expected {
        let want = (expected - written).min(buffer.len());
        let n = match reader.read(&mut buffer[..want]) {
            Ok(0) => {
                warn!("Server closed the connection at {}/{} bytes", written, expected);
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => {
                warn!("Client timeout at {}/{} bytes", written, expected);
                break;
            }
            Err(e) => {
                warn!("Read failed at {}/{} bytes: {}", written, expected, e);
                break;
            }
        };

        if let Err(e) = sink.write_chunk(&buffer[..n]) {
            error!("Flash write failed at offset {}: {}", written, e);
            break;
        }
        hasher.update(&buffer[..n]);
        written += n;

        // Log progress every 10%
        let step = written * 10 / expected;
        if step > last_step {
            info!("OTA Progress: {}% ({}/{})", step * 10, written, expected);
            last_step = step;
        }
    }

    (written, to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FotaConfig;
    use crate::error::MalformedKind;
    use crate::sink::MemorySink;
    use crate::testing::{ok_response, FaultySink, ScriptedConnector};

    fn engine() -> TransferEngine {
        TransferEngine::new(FotaConfig::default().transfer_settings())
    }

    fn target() -> UpdateTarget {
        UpdateTarget::new("fw.local", 80, "/f.bin")
    }

    #[test]
    fn full_image_is_committed() {
        let image = vec![0xA5u8; 3000];
        let mut connector = ScriptedConnector::replying(ok_response(&image));
        let mut sink = MemorySink::new(4096);
        let mut engine = engine();

        let state = engine.run(&mut connector, &mut sink, &target()).unwrap();
        assert_eq!(state.bytes_written, 3000);
        assert!(state.is_complete());
        assert_eq!(sink.data(), &image[..]);
        assert!(sink.is_complete());
        assert_eq!(engine.phase(), Some(TransferPhase::Finalizing));
        assert_eq!(connector.connects(), vec![("fw.local".to_string(), 80)]);
        assert!(connector
            .sent()
            .starts_with("GET /f.bin HTTP/1.1\r\nHost: fw.local\r\n"));
    }

    #[test]
    fn refused_connection_stops_at_connecting() {
        let mut connector = ScriptedConnector::refusing();
        let mut sink = MemorySink::new(16);
        let mut engine = engine();
        let err = engine.run(&mut connector, &mut sink, &target()).unwrap_err();
        assert!(matches!(err, FotaError::Connection(_)));
        assert_eq!(engine.phase(), Some(TransferPhase::Connecting));
    }

    #[test]
    fn silent_server_times_out() {
        let mut connector = ScriptedConnector::silent();
        let mut sink = MemorySink::new(16);
        let mut engine = engine();
        let err = engine.run(&mut connector, &mut sink, &target()).unwrap_err();
        assert!(matches!(err, FotaError::Timeout));
        assert_eq!(engine.phase(), Some(TransferPhase::AwaitingHeaders));
        assert_eq!(sink.reserved(), None);
    }

    #[test]
    fn not_found_never_streams() {
        let mut connector = ScriptedConnector::replying(b"HTTP/1.1 404 Not Found\r\n\r\n".to_vec());
        let mut sink = MemorySink::new(16);
        let mut engine = engine();
        let err = engine.run(&mut connector, &mut sink, &target()).unwrap_err();
        assert!(matches!(
            err,
            FotaError::MalformedResponse(MalformedKind::UnexpectedStatus(404))
        ));
        assert_eq!(engine.phase(), Some(TransferPhase::ValidatingPreconditions));
        assert_eq!(sink.reserved(), None);
    }

    #[test]
    fn zero_length_never_streams() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nContent-Type: application/octet-stream\r\n\r\n";
        let mut connector = ScriptedConnector::replying(raw.to_vec());
        let mut sink = MemorySink::new(16);
        let mut engine = engine();
        assert!(engine.run(&mut connector, &mut sink, &target()).is_err());
        assert_eq!(engine.phase(), Some(TransferPhase::ValidatingPreconditions));
        assert_eq!(sink.reserved(), None);
    }

    #[test]
    fn wrong_content_type_never_streams() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nContent-Type: text/plain\r\n\r\nabcd";
        let mut connector = ScriptedConnector::replying(raw.to_vec());
        let mut sink = MemorySink::new(16);
        let err = engine().run(&mut connector, &mut sink, &target()).unwrap_err();
        assert!(matches!(err, FotaError::InvalidContentType(_)));
        assert_eq!(sink.reserved(), None);
    }

    #[test]
    fn image_larger_than_partition_is_insufficient_storage() {
        let mut connector = ScriptedConnector::replying(ok_response(&[1u8; 64]));
        let mut sink = MemorySink::new(32);
        let err = engine().run(&mut connector, &mut sink, &target()).unwrap_err();
        assert!(matches!(err, FotaError::InsufficientStorage { required: 64 }));
        assert_eq!(sink.finalize_attempts(), 0);
    }

    #[test]
    fn short_body_is_never_finalized() {
        let mut raw = b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nContent-Type: application/octet-stream\r\n\r\n".to_vec();
        raw.extend_from_slice(&[7u8; 800]);
        let mut connector = ScriptedConnector::replying(raw);
        let mut sink = MemorySink::new(4096);
        let mut engine = engine();

        let err = engine.run(&mut connector, &mut sink, &target()).unwrap_err();
        assert!(matches!(
            err,
            FotaError::ShortWrite {
                written: 800,
                expected: 1000
            }
        ));
        assert_eq!(engine.phase(), Some(TransferPhase::Verifying));
        assert_eq!(sink.finalize_attempts(), 0);
        assert_eq!(sink.reserved(), None);
    }

    #[test]
    fn stalled_body_is_a_short_write() {
        let mut raw = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nContent-Type: application/octet-stream\r\n\r\n".to_vec();
        raw.extend_from_slice(&[7u8; 40]);
        let mut connector = ScriptedConnector::replying(raw).stalling_at_end();
        let mut sink = MemorySink::new(4096);
        let err = engine().run(&mut connector, &mut sink, &target()).unwrap_err();
        assert!(matches!(err, FotaError::ShortWrite { written: 40, .. }));
        assert_eq!(sink.finalize_attempts(), 0);
    }

    #[test]
    fn trailing_bytes_are_not_written() {
        let mut raw = ok_response(&[1u8; 10]);
        raw.extend_from_slice(b"garbage");
        let mut connector = ScriptedConnector::replying(raw);
        let mut sink = MemorySink::new(64);
        engine().run(&mut connector, &mut sink, &target()).unwrap();
        assert_eq!(sink.data(), &[1u8; 10]);
    }

    #[test]
    fn rejected_write_stops_the_stream() {
        let mut connector = ScriptedConnector::replying(ok_response(&[3u8; 4096]));
        let mut sink = FaultySink::new(8192).failing_write_after(1024);
        let err = engine().run(&mut connector, &mut sink, &target()).unwrap_err();
        match err {
            FotaError::ShortWrite { written, expected } => {
                assert_eq!(expected, 4096);
                assert!(written <= 1024);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(sink.inner().finalize_attempts(), 0);
    }

    #[test]
    fn finalize_error_code_is_surfaced() {
        let mut connector = ScriptedConnector::replying(ok_response(&[3u8; 8]));
        let mut sink = FaultySink::new(64).failing_finalize(5379);
        let err = engine().run(&mut connector, &mut sink, &target()).unwrap_err();
        assert!(matches!(err, FotaError::FinalizeFailure { code: 5379 }));
        assert_eq!(sink.inner().reserved(), None);
        assert!(!sink.is_complete());
    }

    #[test]
    fn published_digest_must_match() {
        let image = b"firmware image".to_vec();
        let digest = to_hex(&Sha256::digest(&image));

        let mut good = target();
        good.sha256 = Some(digest);
        let mut sink = MemorySink::new(64);
        engine()
            .run(&mut ScriptedConnector::replying(ok_response(&image)), &mut sink, &good)
            .unwrap();
        assert!(sink.is_complete());

        let mut bad = target();
        bad.sha256 = Some("00".repeat(32));
        let mut sink = MemorySink::new(64);
        let err = engine()
            .run(&mut ScriptedConnector::replying(ok_response(&image)), &mut sink, &bad)
            .unwrap_err();
        assert!(matches!(err, FotaError::DigestMismatch { .. }));
        assert_eq!(sink.finalize_attempts(), 0);
    }
}
