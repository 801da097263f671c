//! Fl593Builder -- fluent builder for constructing [`Fl593`] handles.
//!
//! Separates configuration from construction so that callers can set up
//! timeouts, retry policy, and the safety behavior before the transport
//! is attached and bring-up runs.
//!
//! # Example
//!
//! ```no_run
//! use fl593_driver::builder::Fl593Builder;
//! use std::time::Duration;
//!
//! # async fn example() -> fl593_core::Result<()> {
//! let device = Fl593Builder::new()
//!     .timeout(Duration::from_millis(100))
//!     .max_init_retries(10)
//!     .build_tcp("192.168.1.50:5000")
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use fl593_core::error::Result;
use fl593_core::transport::Transport;

use crate::device::{DeviceConfig, Fl593};

/// Fluent builder for [`Fl593`].
///
/// All configuration defaults to the safe behavior: outputs start and
/// end dark, the remote enable is parked off on exit.
#[derive(Debug, Clone, Default)]
pub struct Fl593Builder {
    config: DeviceConfig,
}

impl Fl593Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-exchange protocol timeout (default: 100ms).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the number of bring-up handshake attempts (default: 10).
    pub fn max_init_retries(mut self, n: u32) -> Self {
        self.config.max_init_retries = n;
        self
    }

    /// Set the pause before each handshake attempt (default: 100ms).
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Set the remote enable state written during bring-up (default:
    /// off).
    pub fn startup_remote_enable(mut self, on: bool) -> Self {
        self.config.startup_remote_enable = on;
        self
    }

    /// Set the remote enable state parked during shutdown (default:
    /// off).
    pub fn exit_remote_enable(mut self, on: bool) -> Self {
        self.config.exit_remote_enable = on;
        self
    }

    /// Zero both lasers' limit and setpoint during bring-up (default:
    /// on).
    pub fn zero_on_start(mut self, on: bool) -> Self {
        self.config.zero_on_start = on;
        self
    }

    /// Zero both lasers' limit and setpoint during shutdown (default:
    /// on).
    pub fn zero_on_close(mut self, on: bool) -> Self {
        self.config.zero_on_close = on;
        self
    }

    /// Attach an already-established transport and run bring-up.
    ///
    /// This is the main entry point for tests (mock or simulated
    /// transports) and for custom transports.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Fl593> {
        let device = Fl593::new(transport, self.config);
        device.initialize().await?;
        Ok(device)
    }

    /// Connect over TCP and run bring-up.
    pub async fn build_tcp(self, addr: &str) -> Result<Fl593> {
        let transport = fl593_transport::TcpTransport::connect(addr).await?;
        self.build_with_transport(Box::new(transport)).await
    }

    /// Open the first board on the USB bus and run bring-up.
    #[cfg(feature = "usb")]
    pub async fn build_usb(self) -> Result<Fl593> {
        let transport = fl593_transport::UsbTransport::open()?;
        self.build_with_transport(Box::new(transport)).await
    }
}
