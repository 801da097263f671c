//! # fl593 -- Host-Side Control for the FL593FL Laser Diode Driver
//!
//! `fl593` is an asynchronous Rust library for controlling the
//! TeamWavelength FL593FL laser diode driver evaluation board. It is
//! designed for lab automation, monitoring UIs, and scripted experiments
//! where the laser must come up dark, stay inside its limits, and go
//! dark again no matter how the session ends.
//!
//! ## Quick Start
//!
//! Add `fl593` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! fl593 = { version = "0.1", features = ["usb"] }
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to a board and read its monitors:
//!
//! ```no_run
//! use fl593::Fl593Builder;
//!
//! #[tokio::main]
//! async fn main() -> fl593::Result<()> {
//!     let device = Fl593Builder::new()
//!         .build_tcp("192.168.1.50:5000")
//!         .await?;
//!
//!     println!("model:  {}", device.status().model().await?);
//!     println!("serial: {}", device.status().serial().await?);
//!
//!     device.ld1().set_limit_ma(100.0).await?;
//!     device.ld1().set_setpoint_ma(50.0).await?;
//!     device.status().set_remote_enable(true).await?;
//!
//!     println!("IMON: {:.2} mA", device.ld1().current_monitor_ma().await?);
//!
//!     device.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                | Purpose                                      |
//! |----------------------|----------------------------------------------|
//! | `fl593-core`         | [`Transport`] trait, protocol types, errors, read cache |
//! | `fl593-transport`    | TCP and USB transport implementations        |
//! | `fl593-driver`       | Packet codec, channels, device state machine |
//! | `fl593-test-harness` | Mock and simulated transports                |
//! | **`fl593`**          | This facade crate -- re-exports everything   |
//!
//! ## Feature Flags
//!
//! | Feature | Enables                                  | Default |
//! |---------|------------------------------------------|---------|
//! | `usb`   | Direct USB access via libusb             | no      |
//!
//! ## Safety Behavior
//!
//! The defaults keep the hardware dark at the session boundaries:
//! bring-up zeroes both channels' limit and setpoint and parks the
//! remote enable off, and [`Fl593::close`] zeroes both channels again
//! before the transport is released. All shutdown steps run even when
//! earlier ones fail.

pub use fl593_core::{
    Alarm, CacheKey, ChannelId, Clock, EndCode, Error, ExpiringCache, FeedbackMode, ManualClock,
    OpCode, OpType, Result, SystemClock, Transport, Ttl, ttl_policy,
};
pub use fl593_driver::{
    builder::Fl593Builder,
    channel::RegisterChannel,
    device::{DeviceConfig, DeviceSnapshot, DeviceState, Fl593},
    laser::{LaserChannel, LaserSnapshot},
    protocol,
    status::StatusChannel,
};
pub use fl593_transport::TcpTransport;

#[cfg(feature = "usb")]
pub use fl593_transport::UsbTransport;
