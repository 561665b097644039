//! Host-based tests for the updater
//! Full check and transfer cycles against loopback HTTP servers, real sockets

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use esp_fota::http::{HttpClient, HttpResponse};
use esp_fota::{Device, FotaError};

/// One-shot server: accepts a single connection, captures the request head,
/// sends `reply` and keeps the socket open for `hold` before closing
pub fn serve_once(reply: Vec<u8>, hold: Duration) -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream);
        let mut head = String::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                break;
            }
            head.push_str(&line);
        }
        let mut stream = reader.into_inner();
        let _ = stream.write_all(&reply);
        let _ = stream.flush();
        thread::sleep(hold);
        head
    });
    (port, handle)
}

pub fn image_response(content_type: &str, declared: usize, body: &[u8]) -> Vec<u8> {
    let mut raw = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        content_type, declared
    )
    .into_bytes();
    raw.extend_from_slice(body);
    raw
}

/// Manifest server stand-in; posts are recorded
pub struct StaticHttp {
    pub manifest: String,
    pub post_status: u16,
    pub posts: Vec<(String, Vec<u8>)>,
}

impl StaticHttp {
    pub fn new(manifest: &str) -> Self {
        Self {
            manifest: manifest.to_string(),
            post_status: 200,
            posts: Vec::new(),
        }
    }
}

impl HttpClient for StaticHttp {
    fn get(&mut self, _url: &str, max_body: usize) -> Result<HttpResponse, FotaError> {
        if self.manifest.len() > max_body {
            return Err(FotaError::Transport("manifest too large".into()));
        }
        Ok(HttpResponse {
            status: 200,
            body: self.manifest.as_bytes().to_vec(),
        })
    }

    fn post(
        &mut self,
        url: &str,
        _headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, FotaError> {
        self.posts.push((url.to_string(), body.to_vec()));
        Ok(HttpResponse {
            status: self.post_status,
            body: Vec::new(),
        })
    }
}

#[derive(Default)]
pub struct HostDevice {
    pub restarts: usize,
}

impl Device for HostDevice {
    fn chip_id(&self) -> String {
        "8796093022208".to_string()
    }

    fn mac_address(&self) -> String {
        "24:0A:C4:00:00:01".to_string()
    }

    fn is_network_connected(&self) -> bool {
        true
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esp_fota::net::TcpConnector;
    use esp_fota::{FirmwareIdentity, Fota, FotaConfig, MalformedKind, MemorySink, TransferPhase};

    type HostFota = Fota<StaticHttp, TcpConnector, MemorySink, HostDevice>;

    fn config() -> FotaConfig {
        FotaConfig {
            check_url: "http://updates.local/check".to_string(),
            connect_timeout_ms: 1000,
            first_byte_timeout_ms: 300,
            read_timeout_ms: 300,
            report_settle_ms: 0,
            ..Default::default()
        }
    }

    fn manifest_for(port: u16) -> String {
        format!(
            r#"[{{"type":"app","version":5,"host":"127.0.0.1","port":{},"bin":"/fw.bin"}}]"#,
            port
        )
    }

    fn updater(port: u16, config: FotaConfig) -> HostFota {
        Fota::new(
            FirmwareIdentity::new("app", 3),
            config,
            StaticHttp::new(&manifest_for(port)),
            TcpConnector,
            MemorySink::new(1 << 20),
            HostDevice::default(),
        )
        .expect("valid config")
    }

    #[test]
    fn full_update_commits_and_restarts() {
        let image: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let (port, server) = serve_once(
            image_response("application/octet-stream", image.len(), &image),
            Duration::ZERO,
        );
        let mut fota = updater(port, config());

        assert!(fota.check_for_update());
        fota.try_transfer().expect("transfer succeeds");

        let head = server.join().expect("server thread");
        assert!(head.starts_with("GET /fw.bin HTTP/1.1\r\n"));
        assert!(head.contains(&format!("Host: 127.0.0.1:{}\r\n", port)));
        assert!(head.contains("Cache-Control: no-cache\r\n"));
        assert_eq!(fota.sink().data(), &image[..]);
        assert_eq!(fota.device().restarts, 1);
    }

    #[test]
    fn truncated_body_keeps_running_image() {
        let (port, server) = serve_once(
            image_response("application/octet-stream", 1000, &[7u8; 600]),
            Duration::ZERO,
        );
        let mut fota = updater(port, config());

        assert!(fota.check_for_update());
        let err = fota.try_transfer().unwrap_err();
        server.join().expect("server thread");

        assert!(matches!(err, FotaError::ShortWrite { written: 600, expected: 1000 }));
        assert_eq!(fota.sink().finalize_attempts(), 0);
        assert_eq!(fota.device().restarts, 0);
    }

    #[test]
    fn silent_server_times_out() {
        let (port, server) = serve_once(Vec::new(), Duration::from_millis(800));
        let mut fota = updater(port, config());

        assert!(fota.check_for_update());
        let err = fota.try_transfer().unwrap_err();
        server.join().expect("server thread");

        assert!(matches!(err, FotaError::Timeout));
        assert_eq!(fota.last_phase(), Some(TransferPhase::AwaitingHeaders));
        assert_eq!(fota.sink().reserved(), None);
    }

    #[test]
    fn missing_image_is_rejected_before_streaming() {
        let (port, server) = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found".to_vec(),
            Duration::ZERO,
        );
        let mut fota = updater(port, config());

        assert!(fota.check_for_update());
        let err = fota.try_transfer().unwrap_err();
        server.join().expect("server thread");

        assert!(matches!(
            err,
            FotaError::MalformedResponse(MalformedKind::UnexpectedStatus(404))
        ));
        assert_eq!(fota.sink().reserved(), None);
    }

    #[test]
    fn wrong_content_type_is_rejected() {
        let (port, server) = serve_once(image_response("text/html", 4, b"<p/>"), Duration::ZERO);
        let mut fota = updater(port, config());

        assert!(fota.check_for_update());
        let err = fota.try_transfer().unwrap_err();
        server.join().expect("server thread");
        assert!(matches!(err, FotaError::InvalidContentType(_)));
    }

    #[test]
    fn tracked_update_posts_identity() {
        let (port, server) = serve_once(
            image_response("application/octet-stream", 256, &[1u8; 256]),
            Duration::ZERO,
        );
        let mut cfg = config();
        cfg.track_updates = true;
        cfg.track_url = "http://updates.local/updated/".to_string();
        let mut fota = updater(port, cfg);

        assert!(fota.check_for_update());
        fota.try_transfer().expect("transfer succeeds");
        server.join().expect("server thread");

        let (url, body) = &fota.http().posts[0];
        assert_eq!(url, "http://updates.local/updated/");
        let json: serde_json::Value = serde_json::from_slice(body).expect("json body");
        assert_eq!(json["type"], "app");
        assert_eq!(json["version"], 3);
        assert_eq!(json["hardware_id"], "8796093022208");
        assert_eq!(json["device_id"], "24:0A:C4:00:00:01");
        assert_eq!(fota.device().restarts, 1);
    }

    #[test]
    fn current_firmware_is_not_updated() {
        let mut fota = Fota::new(
            FirmwareIdentity::new("app", 5),
            config(),
            StaticHttp::new(&manifest_for(1)),
            TcpConnector,
            MemorySink::new(16),
            HostDevice::default(),
        )
        .expect("valid config");
        assert!(!fota.check_for_update());
        assert!(fota.target().is_none());
    }
}
