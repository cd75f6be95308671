//! Byte-stream transports carrying the storage CLI.
//!
//! The protocol only needs a handful of primitives from the link: open,
//! close, write, a read that waits at most one poll interval, and a count
//! of bytes that can be read without waiting. Serial ports provide these
//! natively; the TCP transport emulates them for UARTs bridged over the
//! network.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

/// A byte-oriented connection to the device.
pub trait Transport {
    /// Open the underlying connection.
    fn open(&mut self) -> io::Result<()>;

    /// Close the underlying connection. Closing a closed transport is a no-op.
    fn close(&mut self) -> io::Result<()>;

    /// Write all bytes to the device.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read up to `buf.len()` bytes, waiting at most one poll interval.
    ///
    /// Returns `Ok(0)` when nothing arrived within the interval.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes that can be read right now without waiting.
    fn bytes_available(&mut self) -> io::Result<usize>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> io::Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_all(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn open(&mut self) -> io::Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_all(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is not open")
}

/// Whether an I/O error just means the poll interval elapsed.
pub(crate) fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// A device UART exposed over TCP (e.g. a serial bridge or simulator port).
pub struct TcpTransport {
    address: String,
    read_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create a transport for `host:port`. Nothing is connected until `open`.
    pub fn new(address: impl Into<String>, read_timeout: Duration) -> Self {
        TcpTransport {
            address: address.into(),
            read_timeout,
            stream: None,
        }
    }

    /// Get the configured address.
    pub fn address(&self) -> &str {
        &self.address
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(not_connected)
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> io::Result<()> {
        let addr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address did not resolve"))?;
        let stream = TcpStream::connect_timeout(&addr, self.read_timeout)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_nodelay(true)?;
        debug!("Connected to {} ({})", self.address, addr);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(stream) = self.stream.take() {
            debug!("Closing connection to {}", self.address);
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let stream = self.stream()?;
        Write::write_all(stream, data)?;
        stream.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let stream = self.stream()?;
        match Read::read(stream, buf) {
            Ok(0) if !buf.is_empty() => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device closed the connection",
            )),
            Ok(n) => Ok(n),
            Err(e) if is_poll_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let stream = self.stream()?;
        let mut scratch = [0u8; 1024];
        stream.set_nonblocking(true)?;
        let peeked = stream.peek(&mut scratch);
        stream.set_nonblocking(false)?;
        match peeked {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_tcp_transport_not_open() {
        let mut transport = TcpTransport::new("127.0.0.1:1", Duration::from_millis(50));
        let err = transport.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(transport.close().is_ok());
    }

    #[test]
    fn test_tcp_transport_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).unwrap();
            socket.write_all(b">: ").unwrap();
            buf
        });

        let mut transport = TcpTransport::new(addr.to_string(), Duration::from_millis(500));
        transport.open().unwrap();
        transport.write_all(b"ping").unwrap();

        let mut received = Vec::new();
        while received.len() < 3 {
            let mut buf = [0u8; 8];
            let n = transport.read(&mut buf).unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b">: ");
        assert_eq!(&server.join().unwrap(), b"ping");
        transport.close().unwrap();
    }

    #[test]
    fn test_tcp_transport_peer_close_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            drop(socket);
        });

        let mut transport = TcpTransport::new(addr.to_string(), Duration::from_millis(500));
        transport.open().unwrap();
        server.join().unwrap();

        let mut buf = [0u8; 8];
        let err = transport.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
