//! Error types for the FL593FL control layer.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! device-reported errors are all captured here.

use crate::types::EndCode;

/// The error type for all FL593FL operations.
///
/// Variants cover the full range of failure modes encountered when
/// driving the evaluation board: physical transport failures, packet
/// decode errors, device-reported end codes, timeouts, and bring-up
/// failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A command could not be constructed (unknown token, wrong token
    /// count, oversized data field).
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A response packet could not be decoded (truncated buffer, header
    /// byte outside the protocol vocabulary).
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The device accepted the packet but reported a failure end code.
    #[error("device error: {0}")]
    Device(EndCode),

    /// A response data field could not be interpreted as the expected
    /// value type.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A transport-level error (USB pipe, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timed out waiting for a response from the device.
    ///
    /// This typically indicates the board is powered off or the bulk IN
    /// endpoint has stalled.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// Device bring-up did not produce a usable device within the retry
    /// budget.
    #[error("initialization failed after {attempts} attempts")]
    InitializationFailed {
        /// Number of handshake attempts made before giving up.
        attempts: u32,
    },

    /// The requested operation is not supported by this library.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed to a device operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_command() {
        let e = Error::InvalidCommand("unknown op-code 'FREQ'".into());
        assert_eq!(e.to_string(), "invalid command: unknown op-code 'FREQ'");
    }

    #[test]
    fn error_display_malformed_packet() {
        let e = Error::MalformedPacket("response truncated at 3 bytes".into());
        assert_eq!(
            e.to_string(),
            "malformed packet: response truncated at 3 bytes"
        );
    }

    #[test]
    fn error_display_device() {
        let e = Error::Device(EndCode::Safety);
        assert_eq!(
            e.to_string(),
            "device error: SAFETY (requested operation not within safety specs)"
        );
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_initialization_failed() {
        let e = Error::InitializationFailed { attempts: 10 };
        assert_eq!(e.to_string(), "initialization failed after 10 attempts");
    }

    #[test]
    fn error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
