// Raw connections for the image download

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Byte stream to the image server
pub trait Connection: Read + Write {
    /// Block until at least one byte can be read or `timeout` elapses.
    /// `Ok(false)` means the deadline passed with nothing to read.
    fn wait_for_data(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Upper bound for every later read
    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

pub trait Connector {
    type Conn: Connection;

    fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> io::Result<Self::Conn>;
}

/// Plain TCP; lwIP sockets on the device, std sockets on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Conn = TcpStream;

    fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(timeout))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", host))
        }))
    }
}

impl Connection for TcpStream {
    fn wait_for_data(&mut self, timeout: Duration) -> io::Result<bool> {
        self.set_read_timeout(Some(timeout))?;
        let mut probe = [0u8; 1];
        match self.peek(&mut probe) {
            // includes an orderly close, the scanner reports it
            Ok(_) => Ok(true),
            Err(e) if is_timeout(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }
}

/// Read deadline expiry. Unix reports `WouldBlock`, Windows `TimedOut`.
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
