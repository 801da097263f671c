//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts over the physical link to an FL593FL
//! board. Implementations exist for the board's USB bulk endpoints, TCP
//! sockets (serial-over-network bridges), and mock transports for testing.
//!
//! The protocol codec and channel layers in `fl593-driver` operate on a
//! `Transport` rather than directly on a USB handle, enabling both real
//! hardware control and deterministic unit testing with `MockTransport`
//! from the `fl593-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a device.
///
/// Implementations handle buffering and error recovery at the physical
/// layer. Protocol-level concerns (packet framing, end-code checking) are
/// handled by the layers that consume this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport (USB OUT endpoint, TCP socket, etc.).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
