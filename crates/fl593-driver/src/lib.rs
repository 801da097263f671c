//! FL593FL protocol backend and device driver.
//!
//! This crate implements the WEI fixed-format binary register protocol
//! spoken by the TeamWavelength FL593FL laser diode driver evaluation
//! board. It provides:
//!
//! - **Protocol codec** ([`protocol`]) -- encode and decode the 20-byte
//!   command / 21-byte response packets, interpret data fields, and parse
//!   the `<channel> <op_type> <op_code> [data]` text grammar.
//! - **Register channels** ([`channel`]) -- cache-wrapped READ/WRITE/MIN/
//!   MAX access to one board channel over a shared transport.
//! - **Typed channels** ([`status`], [`laser`]) -- device identity,
//!   alarms, and the enable switch on channel 0; monitors, setpoint, and
//!   limit in milliamps on the laser channels.
//! - **Device state machine** ([`device`]) -- bring-up with paced
//!   retries, periodic refresh, and the safety shutdown that leaves the
//!   hardware dark before the transport is released.
//! - **Builder** ([`builder`]) -- fluent construction with safe
//!   defaults.
//!
//! # Example
//!
//! ```
//! use fl593_driver::protocol::{encode_command, ResponsePacket};
//!
//! // Build a "read channel 1 current monitor" packet
//! let cmd = encode_command("LD1 READ IMON").unwrap();
//! assert_eq!(&cmd[..4], &[0x00, 0x01, 0x01, 0x15]);
//! assert_eq!(cmd.len(), 20);
//!
//! // Decode a response carrying 123.4 mA
//! let mut raw = vec![0x00, 0x01, 0x01, 0x15, 0x00];
//! raw.extend_from_slice(b"0.1234");
//! raw.resize(21, 0);
//! let response = ResponsePacket::decode(&raw).unwrap();
//! assert_eq!(response.data_f64().unwrap(), 0.1234);
//! ```

pub mod builder;
pub mod channel;
pub mod device;
pub mod laser;
pub mod protocol;
pub mod status;

// Re-export the primary types for ergonomic `use fl593_driver::*`.
pub use builder::Fl593Builder;
pub use device::{DeviceConfig, DeviceSnapshot, DeviceState, Fl593};
pub use laser::{LaserChannel, LaserSnapshot};
pub use status::StatusChannel;
