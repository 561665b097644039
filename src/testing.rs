// Test doubles for the platform traits

use std::cell::RefCell;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use crate::device::Device;
use crate::error::FotaError;
use crate::http::{HttpClient, HttpResponse};
use crate::net::{Connection, Connector};
use crate::sink::{FlashSink, MemorySink, SinkError};

pub fn ok_response(body: &[u8]) -> Vec<u8> {
    let mut raw = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);
    raw
}

pub struct FakeDevice {
    chip_id: String,
    mac: String,
    pub connected: bool,
    pub restarts: usize,
}

impl FakeDevice {
    pub fn new(chip_id: &str, mac: &str) -> Self {
        Self {
            chip_id: chip_id.to_string(),
            mac: mac.to_string(),
            connected: true,
            restarts: 0,
        }
    }
}

impl Device for FakeDevice {
    fn chip_id(&self) -> String {
        self.chip_id.clone()
    }

    fn mac_address(&self) -> String {
        self.mac.clone()
    }

    fn is_network_connected(&self) -> bool {
        self.connected
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }
}

#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Canned replies, every request recorded
#[derive(Default)]
pub struct ScriptedHttp {
    pub get_response: Option<HttpResponse>,
    pub post_response: Option<HttpResponse>,
    pub gets: Vec<String>,
    pub posts: Vec<RecordedPost>,
}

impl ScriptedHttp {
    pub fn manifest(body: &str) -> Self {
        Self {
            get_response: Some(HttpResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
            }),
            post_response: Some(HttpResponse {
                status: 201,
                body: Vec::new(),
            }),
            ..Default::default()
        }
    }
}

impl HttpClient for ScriptedHttp {
    fn get(&mut self, url: &str, _max_body: usize) -> Result<HttpResponse, FotaError> {
        self.gets.push(url.to_string());
        self.get_response
            .clone()
            .ok_or_else(|| FotaError::Transport("connection refused".into()))
    }

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, FotaError> {
        self.posts.push(RecordedPost {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_vec(),
        });
        self.post_response
            .clone()
            .ok_or_else(|| FotaError::Transport("connection refused".into()))
    }
}

enum Behaviour {
    Reply,
    Silent,
    Refuse,
}

/// Connector whose single server reply is a fixed byte string
pub struct ScriptedConnector {
    reply: Vec<u8>,
    behaviour: Behaviour,
    stall_at_end: bool,
    connects: Vec<(String, u16)>,
    sent: Rc<RefCell<Vec<u8>>>,
}

impl ScriptedConnector {
    fn with(reply: Vec<u8>, behaviour: Behaviour) -> Self {
        Self {
            reply,
            behaviour,
            stall_at_end: false,
            connects: Vec::new(),
            sent: Rc::default(),
        }
    }

    pub fn replying(reply: Vec<u8>) -> Self {
        Self::with(reply, Behaviour::Reply)
    }

    pub fn silent() -> Self {
        Self::with(Vec::new(), Behaviour::Silent)
    }

    pub fn refusing() -> Self {
        Self::with(Vec::new(), Behaviour::Refuse)
    }

    /// Reads past the reply time out instead of returning end of stream
    pub fn stalling_at_end(mut self) -> Self {
        self.stall_at_end = true;
        self
    }

    pub fn connects(&self) -> Vec<(String, u16)> {
        self.connects.clone()
    }

    pub fn sent(&self) -> String {
        String::from_utf8_lossy(&self.sent.borrow()).into_owned()
    }
}

impl Connector for ScriptedConnector {
    type Conn = ScriptedConn;

    fn connect(&mut self, host: &str, port: u16, _timeout: Duration) -> io::Result<ScriptedConn> {
        self.connects.push((host.to_string(), port));
        if let Behaviour::Refuse = self.behaviour {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        Ok(ScriptedConn {
            input: Cursor::new(self.reply.clone()),
            silent: matches!(self.behaviour, Behaviour::Silent),
            stall_at_end: self.stall_at_end,
            sent: Rc::clone(&self.sent),
        })
    }
}

pub struct ScriptedConn {
    input: Cursor<Vec<u8>>,
    silent: bool,
    stall_at_end: bool,
    sent: Rc<RefCell<Vec<u8>>>,
}

impl Read for ScriptedConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.input.read(buf)?;
        if n == 0 && self.stall_at_end && !buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "stalled"));
        }
        Ok(n)
    }
}

impl Write for ScriptedConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for ScriptedConn {
    fn wait_for_data(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(!self.silent)
    }

    fn set_io_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

/// MemorySink with injectable failures
pub struct FaultySink {
    inner: MemorySink,
    write_limit: Option<usize>,
    finalize_error: Option<i32>,
    never_complete: bool,
    last_error: i32,
}

impl FaultySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: MemorySink::new(capacity),
            write_limit: None,
            finalize_error: None,
            never_complete: false,
            last_error: 0,
        }
    }

    /// Reject any write that would go past `bytes` total
    pub fn failing_write_after(mut self, bytes: usize) -> Self {
        self.write_limit = Some(bytes);
        self
    }

    pub fn failing_finalize(mut self, code: i32) -> Self {
        self.finalize_error = Some(code);
        self
    }

    /// Finalize succeeds but the image is never reported complete
    pub fn never_complete(mut self) -> Self {
        self.never_complete = true;
        self
    }

    pub fn inner(&self) -> &MemorySink {
        &self.inner
    }
}

impl FlashSink for FaultySink {
    fn reserve(&mut self, size: usize) -> Result<(), SinkError> {
        self.inner.reserve(size)
    }

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if let Some(limit) = self.write_limit {
            if self.inner.data().len() + data.len() > limit {
                self.last_error = -10;
                return Err(SinkError::WriteFailed(-10));
            }
        }
        self.inner.write_chunk(data)
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        if let Some(code) = self.finalize_error {
            self.last_error = code;
            return Err(SinkError::ValidationFailed(code));
        }
        self.inner.finalize()
    }

    fn is_complete(&self) -> bool {
        !self.never_complete && self.inner.is_complete()
    }

    fn last_error_code(&self) -> i32 {
        if self.last_error != 0 {
            self.last_error
        } else {
            self.inner.last_error_code()
        }
    }

    fn abort(&mut self) {
        self.inner.abort()
    }
}
