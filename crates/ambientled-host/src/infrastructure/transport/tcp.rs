//! TCP link to the network controller.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::application::send_loop::{Transport, TransportError};

/// Connected socket with Nagle's algorithm disabled.
pub struct TcpLink {
    stream: TcpStream,
    endpoint: String,
}

impl TcpLink {
    /// Resolves `host` and connects to the first address that accepts.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Resolve`] if `host` resolves to no address.
    /// - [`TransportError::Connect`] if resolution or every connect attempt fails.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = format!("{host}:{port}");
        let connect_error = |source: io::Error| TransportError::Connect {
            endpoint: endpoint.clone(),
            source,
        };

        // A zero timeout is rejected by connect_timeout.
        let timeout = timeout.max(Duration::from_millis(1));
        let mut last_error = None;
        for addr in (host, port).to_socket_addrs().map_err(connect_error)? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(connect_error)?;
                    debug!("TCP link to {endpoint} via {addr}");
                    return Ok(Self { stream, endpoint });
                }
                Err(e) => {
                    debug!("connect to {addr} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(source) => connect_error(source),
            None => TransportError::Resolve { endpoint },
        })
    }

    /// Sets the timeout for subsequent writes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the socket rejects the option.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.stream
            .set_write_timeout(timeout.filter(|t| !t.is_zero()))
            .map_err(|source| TransportError::Connect {
                endpoint: self.endpoint.clone(),
                source,
            })
    }
}

impl Transport for TcpLink {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.stream
            .write_all(frame)
            .map_err(|source| TransportError::Write {
                endpoint: self.endpoint.clone(),
                source,
            })
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        debug!("TCP link to {} closed", self.endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_link_enables_nodelay_and_writes_frames() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // Act
        let mut link = TcpLink::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        link.send(&[9, 8, 7]).unwrap();

        // Assert
        assert!(link.stream.nodelay().unwrap());
        let mut received = [0u8; 3];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(received, [9, 8, 7]);
    }

    #[test]
    fn test_zero_write_timeout_means_blocking() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut link = TcpLink::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();

        link.set_write_timeout(Some(Duration::ZERO)).unwrap();

        assert_eq!(link.stream.write_timeout().unwrap(), None);
    }

    #[test]
    fn test_peer_close_surfaces_as_write_error() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut link = TcpLink::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        let (peer, _) = listener.accept().unwrap();
        drop(peer);
        drop(listener);

        // Act – the first writes may still be buffered; keep writing until
        // the reset is reported.
        let frame = vec![0u8; 4096];
        let failed = (0..1000).any(|_| link.send(&frame).is_err());

        // Assert
        assert!(failed, "writing to a closed peer must eventually fail");
    }
}
