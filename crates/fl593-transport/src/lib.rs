//! Transport implementations for the FL593FL control layer.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](fl593_core::Transport) trait from `fl593-core`:
//!
//! - [`TcpTransport`]: TCP connections for serial-over-network bridges
//!   and socket-served simulators
//! - [`UsbTransport`] (feature `usb`): direct access to the board's bulk
//!   endpoints via libusb
//!
//! # Example
//!
//! ```no_run
//! use fl593_transport::TcpTransport;
//! use fl593_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> fl593_core::Result<()> {
//! let mut transport = TcpTransport::connect("192.168.1.50:5000").await?;
//! transport.send(&[0u8; 20]).await?;
//! let mut buf = [0u8; 64];
//! let n = transport.receive(&mut buf, Duration::from_millis(100)).await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;

#[cfg(feature = "usb")]
pub mod usb;

pub use tcp::TcpTransport;

#[cfg(feature = "usb")]
pub use usb::UsbTransport;
