//! TCP transport for device communication.
//!
//! This module provides [`TcpTransport`], which implements the
//! [`Transport`] trait for boards reachable over a TCP socket, typically
//! a serial-over-network bridge (ser2net, socat) in front of the board's
//! virtual COM port, or the packet simulator in `fl593-test-harness`
//! served over a socket.
//!
//! The protocol is strictly request/response with fixed packet lengths:
//! 20 bytes out, 21 bytes back, nothing unsolicited. The receive path is
//! built around that shape: one `receive()` call keeps reading until the
//! caller's buffer is full or the deadline passes, so a response split
//! across TCP segments still arrives framed in a single call.
//!
//! # Example
//!
//! ```no_run
//! use fl593_transport::TcpTransport;
//! use fl593_core::transport::Transport;
//! use fl593_core::types::RSP_PACKET_LEN;
//! use std::time::Duration;
//!
//! # async fn example() -> fl593_core::Result<()> {
//! let mut transport = TcpTransport::connect("192.168.1.50:5000").await?;
//!
//! // Send a 20-byte command packet
//! let mut packet = [0u8; 20];
//! packet[..4].copy_from_slice(&[0x00, 0x00, 0x01, 0x00]); // READ STATUS MODEL
//! transport.send(&packet).await?;
//!
//! // Collect the full 21-byte response within the protocol timeout
//! let mut response = [0u8; RSP_PACKET_LEN];
//! let n = transport
//!     .receive(&mut response, Duration::from_millis(100))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use fl593_core::error::{Error, Result};
use fl593_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default connection timeout (5 seconds).
///
/// Generous enough for LAN bridges while still failing fast when the
/// bridge host is unreachable.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP transport for device communication.
///
/// The connection is established eagerly via
/// [`connect`](TcpTransport::connect) or
/// [`connect_with_timeout`](TcpTransport::connect_with_timeout) and
/// carries exactly one packet exchange at a time.
#[derive(Debug)]
pub struct TcpTransport {
    /// The underlying TCP stream, `None` after `close()` is called.
    stream: Option<TcpStream>,
    /// The address string for logging/debugging.
    addr: String,
}

impl TcpTransport {
    /// Connect to a TCP endpoint using the default timeout.
    ///
    /// The `addr` parameter should be a `host:port` string, e.g.,
    /// `"192.168.1.50:5000"` or `"localhost:5000"`.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to a TCP endpoint with a specified timeout.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to device bridge"
        );

        let connect = TcpStream::connect(addr);
        let stream = match tokio::time::timeout(timeout, connect).await {
            Err(_) => {
                tracing::error!(addr = %addr, "Connection attempt timed out");
                return Err(Error::Timeout);
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                tracing::error!(addr = %addr, "Connection refused");
                return Err(Error::Transport(format!("connection refused: {}", addr)));
            }
            Ok(Err(e)) => {
                tracing::error!(addr = %addr, error = %e, "Connection failed");
                return Err(Error::Io(e));
            }
            Ok(Ok(stream)) => stream,
        };

        // Disable Nagle's algorithm: every exchange is a single 20-byte
        // packet that must not sit in a coalescing buffer against a
        // 100 ms protocol timeout.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        tracing::info!(addr = %addr, "Device bridge connected");

        Ok(Self {
            stream: Some(stream),
            addr: addr.to_string(),
        })
    }

    /// Wrap an existing `TcpStream` as a `TcpTransport`.
    ///
    /// Useful when a TCP connection has already been established
    /// externally (e.g., accepted from a listener in tests).
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        tracing::debug!(addr = %addr, "Wrapping existing TCP stream");
        Self {
            stream: Some(stream),
            addr,
        }
    }

    /// Get the address string this transport was connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            addr = %self.addr,
            bytes = data.len(),
            data = ?data,
            "Sending packet"
        );

        // write_all + flush so the whole command hits the wire before
        // the response timer starts.
        let written = async {
            stream.write_all(data).await?;
            stream.flush().await
        }
        .await;

        written.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to send packet");
            disconnect_or_io(e)
        })
    }

    /// Collect bytes until the caller's buffer is full, the deadline
    /// passes, or the peer closes.
    ///
    /// Callers size `buf` to the response packet, so a full buffer is a
    /// framed response even when the bridge splits it across segments.
    /// Returns what arrived (possibly a short packet) once the deadline
    /// passes, or [`Error::Timeout`] if nothing arrived at all.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let deadline = tokio::time::Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, stream.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => {
                    if filled == 0 {
                        tracing::warn!(addr = %self.addr, "Peer closed connection");
                        return Err(Error::ConnectionLost);
                    }
                    // Closed mid-packet; hand back the short packet and
                    // let the decoder report it.
                    tracing::warn!(
                        addr = %self.addr,
                        bytes = filled,
                        "Peer closed connection mid-packet"
                    );
                    break;
                }
                Ok(Ok(n)) => {
                    filled += n;
                    tracing::trace!(
                        addr = %self.addr,
                        bytes = n,
                        total = filled,
                        "Packet bytes arrived"
                    );
                }
                Ok(Err(e)) => {
                    tracing::error!(addr = %self.addr, error = %e, "Failed to receive");
                    return Err(disconnect_or_io(e));
                }
                Err(_) => break,
            }
        }

        if filled == 0 {
            tracing::trace!(
                addr = %self.addr,
                timeout_ms = timeout.as_millis(),
                "No response within deadline"
            );
            return Err(Error::Timeout);
        }
        Ok(filled)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!(addr = %self.addr, "Closing device bridge connection");
            if let Err(e) = stream.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }
            tracing::info!(addr = %self.addr, "Device bridge connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(addr = %self.addr, "TcpTransport dropped, closing connection");
        }
    }
}

/// Map a data-path I/O error: peer-gone conditions become
/// [`Error::ConnectionLost`], everything else stays an I/O error.
fn disconnect_or_io(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fl593_core::transport::Transport;
    use fl593_core::types::{CMD_PACKET_LEN, RSP_PACKET_LEN};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Helper: bind a TcpListener on a random available port and return
    /// it along with its address string.
    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    fn command_packet() -> [u8; CMD_PACKET_LEN] {
        let mut packet = [0u8; CMD_PACKET_LEN];
        packet[..4].copy_from_slice(&[0x00, 0x00, 0x01, 0x00]);
        packet
    }

    fn response_packet() -> [u8; RSP_PACKET_LEN] {
        let mut packet = [0u8; RSP_PACKET_LEN];
        packet[..5].copy_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00]);
        packet[5..12].copy_from_slice(b"FL593FL");
        packet
    }

    #[tokio::test]
    async fn full_packet_exchange() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; CMD_PACKET_LEN];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, command_packet());
            stream.write_all(&response_packet()).await.unwrap();
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        transport.send(&command_packet()).await.unwrap();

        let mut buf = [0u8; RSP_PACKET_LEN];
        let n = transport
            .receive(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(n, RSP_PACKET_LEN);
        assert_eq!(buf, response_packet());

        transport.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn response_split_across_segments_arrives_framed() {
        let (listener, addr) = test_listener().await;

        // Bridge dribbles the response out in three segments.
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let response = response_packet();
            for chunk in response.chunks(8) {
                stream.write_all(chunk).await.unwrap();
                stream.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();

        // One receive call collects the whole packet.
        let mut buf = [0u8; RSP_PACKET_LEN];
        let n = transport
            .receive(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(n, RSP_PACKET_LEN);
        assert_eq!(buf, response_packet());

        transport.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn short_packet_is_returned_after_deadline() {
        let (listener, addr) = test_listener().await;

        // Bridge sends 5 bytes and then goes quiet with the connection
        // still open.
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&response_packet()[..5]).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();

        let mut buf = [0u8; RSP_PACKET_LEN];
        let n = transport
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(n, 5);

        transport.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn silent_bridge_times_out() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();

        let mut buf = [0u8; RSP_PACKET_LEN];
        let result = transport
            .receive(&mut buf, Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));

        transport.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn connect_refused() {
        // Bind a listener and immediately drop it so the port is not
        // listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        match TcpTransport::connect(&addr).await.unwrap_err() {
            Error::Transport(msg) => assert!(
                msg.contains("connection refused"),
                "expected 'connection refused' in message, got: {}",
                msg
            ),
            other => panic!("expected Transport error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn peer_close_before_any_data_is_connection_lost() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        server.await.unwrap();

        // Give the OS a moment to propagate the FIN
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = [0u8; RSP_PACKET_LEN];
        let result = transport.receive(&mut buf, Duration::from_secs(2)).await;
        assert!(
            matches!(result, Err(Error::ConnectionLost)),
            "expected ConnectionLost, got: {:?}",
            result
        );
    }

    #[tokio::test]
    async fn peer_close_mid_packet_returns_short_packet() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&response_packet()[..8]).await.unwrap();
            stream.flush().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = [0u8; RSP_PACKET_LEN];
        let n = transport
            .receive(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(n, 8);
    }

    #[tokio::test]
    async fn io_after_close_returns_not_connected() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.addr(), addr);

        transport.close().await.unwrap();
        assert!(!transport.is_connected());

        assert!(matches!(
            transport.send(&command_packet()).await,
            Err(Error::NotConnected)
        ));
        let mut buf = [0u8; RSP_PACKET_LEN];
        assert!(matches!(
            transport.receive(&mut buf, Duration::from_secs(1)).await,
            Err(Error::NotConnected)
        ));

        // Closing again is a no-op, should not error
        transport.close().await.unwrap();

        server.abort();
    }

    #[tokio::test]
    async fn from_stream_carries_an_exchange() {
        let (listener, _addr) = test_listener().await;
        let listener_addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; CMD_PACKET_LEN];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&response_packet()).await.unwrap();
        });

        let raw_stream = TcpStream::connect(listener_addr).await.unwrap();
        let mut transport = TcpTransport::from_stream(raw_stream, listener_addr.to_string());
        assert!(transport.is_connected());

        transport.send(&command_packet()).await.unwrap();

        let mut buf = [0u8; RSP_PACKET_LEN];
        let n = transport
            .receive(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(n, RSP_PACKET_LEN);

        transport.close().await.unwrap();
        server.await.unwrap();
    }
}
