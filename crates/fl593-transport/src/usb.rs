//! USB transport for the FL593FL evaluation board.
//!
//! The board enumerates as vendor 0x1a45, product 0x2001 and exposes a
//! single interface with one bulk OUT endpoint (0x01) and one bulk IN
//! endpoint (0x82). This module wraps a libusb device handle behind the
//! [`Transport`] trait; libusb calls are blocking, so each data-path call
//! is bridged onto the runtime's blocking thread pool.
//!
//! Enabled with the `usb` feature.

use async_trait::async_trait;
use fl593_core::error::{Error, Result};
use fl593_core::transport::Transport;
use fl593_core::types::{USB_ENDPOINT_IN, USB_ENDPOINT_OUT, USB_PRODUCT_ID, USB_VENDOR_ID};
use rusb::{DeviceHandle, GlobalContext};
use std::sync::Arc;
use std::time::Duration;

/// Timeout for bulk OUT writes. Writes complete as soon as the host
/// controller accepts the packet, so this only trips on a wedged pipe.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// USB bulk transport for the FL593FL.
///
/// Opened with [`open`](UsbTransport::open), which finds the first board
/// on the bus by vendor/product ID, detaches any kernel driver, and
/// claims interface 0.
pub struct UsbTransport {
    /// Shared so the handle can be moved into blocking closures.
    /// `None` after `close()`.
    handle: Option<Arc<DeviceHandle<GlobalContext>>>,
}

impl UsbTransport {
    /// Open the first FL593FL found on the bus.
    pub fn open() -> Result<Self> {
        Self::open_vid_pid(USB_VENDOR_ID, USB_PRODUCT_ID)
    }

    /// Open the first device matching the given vendor/product IDs.
    pub fn open_vid_pid(vid: u16, pid: u16) -> Result<Self> {
        tracing::debug!(
            vid = %format_args!("{:04x}", vid),
            pid = %format_args!("{:04x}", pid),
            "Opening USB device"
        );

        let mut handle = rusb::open_device_with_vid_pid(vid, pid).ok_or_else(|| {
            Error::Transport(format!("no USB device {:04x}:{:04x} found", vid, pid))
        })?;

        // On Linux the board may be bound to a kernel HID/CDC driver.
        if handle.kernel_driver_active(0).unwrap_or(false) {
            tracing::debug!("Detaching kernel driver from interface 0");
            handle.detach_kernel_driver(0).map_err(map_usb_error)?;
        }

        handle.set_active_configuration(1).map_err(map_usb_error)?;
        handle.claim_interface(0).map_err(map_usb_error)?;

        // Reset drains any stale response left in the IN endpoint by a
        // previous host session.
        handle.reset().map_err(map_usb_error)?;

        tracing::info!(
            vid = %format_args!("{:04x}", vid),
            pid = %format_args!("{:04x}", pid),
            "USB device opened"
        );

        Ok(Self {
            handle: Some(Arc::new(handle)),
        })
    }
}

#[async_trait]
impl Transport for UsbTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let handle = self.handle.as_ref().ok_or(Error::NotConnected)?.clone();
        let data = data.to_vec();

        tracing::trace!(bytes = data.len(), data = ?data, "Bulk OUT");

        let written = tokio::task::spawn_blocking(move || {
            handle.write_bulk(USB_ENDPOINT_OUT, &data, WRITE_TIMEOUT)
        })
        .await
        .map_err(|e| Error::Transport(format!("blocking task failed: {}", e)))?
        .map_err(map_usb_error)?;

        tracing::trace!(bytes = written, "Bulk OUT complete");
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let handle = self.handle.as_ref().ok_or(Error::NotConnected)?.clone();
        let len = buf.len();

        let received = tokio::task::spawn_blocking(move || {
            let mut scratch = vec![0u8; len];
            handle
                .read_bulk(USB_ENDPOINT_IN, &mut scratch, timeout)
                .map(|n| {
                    scratch.truncate(n);
                    scratch
                })
        })
        .await
        .map_err(|e| Error::Transport(format!("blocking task failed: {}", e)))?
        .map_err(map_usb_error)?;

        tracing::trace!(bytes = received.len(), data = ?received, "Bulk IN");

        buf[..received.len()].copy_from_slice(&received);
        Ok(received.len())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            tracing::debug!("Closing USB device");
            tokio::task::spawn_blocking(move || {
                // Releasing needs exclusive ownership; if a data-path
                // closure still holds a clone, dropping our reference is
                // enough since libusb releases claimed interfaces on the
                // final close.
                if let Ok(mut handle) = Arc::try_unwrap(handle) {
                    if let Err(e) = handle.release_interface(0) {
                        tracing::warn!(error = %e, "Failed to release USB interface (continuing anyway)");
                    }
                }
            })
            .await
            .map_err(|e| Error::Transport(format!("blocking task failed: {}", e)))?;
            tracing::info!("USB device closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.is_some()
    }
}

impl std::fmt::Debug for UsbTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbTransport")
            .field("connected", &self.handle.is_some())
            .finish()
    }
}

/// Map a libusb error to the appropriate [`Error`] variant.
fn map_usb_error(e: rusb::Error) -> Error {
    match e {
        rusb::Error::Timeout => Error::Timeout,
        rusb::Error::NoDevice | rusb::Error::Pipe => Error::ConnectionLost,
        other => Error::Transport(format!("USB error: {}", other)),
    }
}
