//! Protocol vocabulary for the FL593FL evaluation board.
//!
//! The WEI register protocol addresses the board as a set of channels
//! (a status/control channel plus one channel per laser driver), each
//! exposing registers identified by an [`OpCode`]. Every enum here maps
//! bidirectionally between its wire byte, its command-grammar token, and
//! the typed variant, so there are no module-level lookup tables to keep
//! in sync.
//!
//! Note on field widths: the vendor protocol documentation describes
//! 2-byte header fields. Actual devices use 1-byte fields; all offsets
//! and constants here reflect the real 1-byte layout.

use std::fmt;
use std::time::Duration;

/// Device type field value. The FL593FL always reports 0.
pub const DEV_TYPE: u8 = 0x00;

/// Serialized command packet length (host -> device).
pub const CMD_PACKET_LEN: usize = 20;

/// Serialized response packet length (device -> host).
pub const RSP_PACKET_LEN: usize = 21;

/// Maximum length of the data field in either direction.
pub const MAX_DATA_LEN: usize = 16;

/// Number of flags in the alarm bit vector.
pub const NUM_ALARMS: usize = 10;

/// ASCII flag encoding: the device uses literal `'0'`/`'1'` characters,
/// not numeric zero/non-zero.
pub const FLAG_OFF: u8 = b'0';
/// ASCII flag encoding for "on".
pub const FLAG_ON: u8 = b'1';

/// Default per-exchange protocol timeout.
pub const PROTOCOL_TIMEOUT: Duration = Duration::from_millis(100);

/// Number of bring-up handshake attempts before a device is declared dead.
pub const MAX_INIT_RETRIES: u32 = 10;

/// USB vendor ID of the FL593FL evaluation board.
pub const USB_VENDOR_ID: u16 = 0x1a45;
/// USB product ID of the FL593FL evaluation board.
pub const USB_PRODUCT_ID: u16 = 0x2001;
/// Bulk OUT endpoint address.
pub const USB_ENDPOINT_OUT: u8 = 0x01;
/// Bulk IN endpoint address.
pub const USB_ENDPOINT_IN: u8 = 0x82;

/// Addressable sub-target on the board.
///
/// Channel 0 is the status/control channel (device identity, alarms,
/// enable flags); channels 1 and 2 are the two laser driver channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// Status/control channel.
    Status,
    /// Laser driver channel 1.
    Ld1,
    /// Laser driver channel 2.
    Ld2,
}

impl ChannelId {
    /// All channels, in wire order.
    pub const ALL: [ChannelId; 3] = [ChannelId::Status, ChannelId::Ld1, ChannelId::Ld2];

    /// The wire byte for this channel.
    pub fn wire(&self) -> u8 {
        match self {
            ChannelId::Status => 0,
            ChannelId::Ld1 => 1,
            ChannelId::Ld2 => 2,
        }
    }

    /// Resolve a wire byte back to a channel.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ChannelId::Status),
            1 => Some(ChannelId::Ld1),
            2 => Some(ChannelId::Ld2),
            _ => None,
        }
    }

    /// The command-grammar token for this channel.
    pub fn token(&self) -> &'static str {
        match self {
            ChannelId::Status => "STATUS",
            ChannelId::Ld1 => "LD1",
            ChannelId::Ld2 => "LD2",
        }
    }

    /// Resolve a (case-insensitive) command-grammar token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "STATUS" => Some(ChannelId::Status),
            "LD1" => Some(ChannelId::Ld1),
            "LD2" => Some(ChannelId::Ld2),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Operation kind applied to a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    /// Return the register value to the host.
    Read,
    /// Write the register value on the device.
    Write,
    /// Return the minimum allowed value of the register.
    Min,
    /// Return the maximum allowed value of the register.
    Max,
}

impl OpType {
    pub fn wire(&self) -> u8 {
        match self {
            OpType::Read => 1,
            OpType::Write => 2,
            OpType::Min => 3,
            OpType::Max => 4,
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(OpType::Read),
            2 => Some(OpType::Write),
            3 => Some(OpType::Min),
            4 => Some(OpType::Max),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            OpType::Read => "READ",
            OpType::Write => "WRITE",
            OpType::Min => "MIN",
            OpType::Max => "MAX",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "READ" => Some(OpType::Read),
            "WRITE" => Some(OpType::Write),
            "MIN" => Some(OpType::Min),
            "MAX" => Some(OpType::Max),
            _ => None,
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Register identifier.
///
/// Codes below 0x10 are general (identity, persistence); codes at 0x10
/// and above are device-specific (driver state, monitors, limits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Device model string (read-only).
    Model,
    /// Device serial number.
    Serial,
    /// Firmware version string (read-only).
    FwVer,
    /// Device type (read-only, always 0 for this board).
    DevType,
    /// Number of channels supported in the current mode (read-only).
    ChanCt,
    /// Identify flag (blinks the board LED).
    Identify,
    /// Save current settings to non-volatile memory.
    Save,
    /// Recall settings from non-volatile memory.
    Recall,
    /// Calibration-mode password.
    Passwd,
    /// Leave calibration mode, reverting unsaved changes.
    Revert,
    /// Alarm flag bit vector (read-only).
    Alarm,
    /// Setpoint; units depend on the feedback mode.
    Setpoint,
    /// Current limit in amperes (applies in CC, CP, and analog modulation).
    Limit,
    /// Feedback mode (constant current / constant power).
    Mode,
    /// Tracking configuration (independent / parallel).
    Track,
    /// Current monitor (read-only).
    IMon,
    /// Power monitor (read-only).
    PMon,
    /// Remote output enable. Output additionally requires the local
    /// enable switch and the NT pin.
    Enable,
    /// Photodiode feedback resistor in kOhm.
    Rpd,
    /// Current monitor calibration scaling value (calibration mode only).
    CalIScale,
}

impl OpCode {
    /// All registers, for exhaustive iteration in tests and tooling.
    pub const ALL: [OpCode; 20] = [
        OpCode::Model,
        OpCode::Serial,
        OpCode::FwVer,
        OpCode::DevType,
        OpCode::ChanCt,
        OpCode::Identify,
        OpCode::Save,
        OpCode::Recall,
        OpCode::Passwd,
        OpCode::Revert,
        OpCode::Alarm,
        OpCode::Setpoint,
        OpCode::Limit,
        OpCode::Mode,
        OpCode::Track,
        OpCode::IMon,
        OpCode::PMon,
        OpCode::Enable,
        OpCode::Rpd,
        OpCode::CalIScale,
    ];

    pub fn wire(&self) -> u8 {
        match self {
            OpCode::Model => 0x00,
            OpCode::Serial => 0x01,
            OpCode::FwVer => 0x02,
            OpCode::DevType => 0x03,
            OpCode::ChanCt => 0x04,
            OpCode::Identify => 0x05,
            OpCode::Save => 0x0C,
            OpCode::Recall => 0x0D,
            OpCode::Passwd => 0x0E,
            OpCode::Revert => 0x0F,
            OpCode::Alarm => 0x10,
            OpCode::Setpoint => 0x11,
            OpCode::Limit => 0x12,
            OpCode::Mode => 0x13,
            OpCode::Track => 0x14,
            OpCode::IMon => 0x15,
            OpCode::PMon => 0x16,
            OpCode::Enable => 0x17,
            OpCode::Rpd => 0x19,
            OpCode::CalIScale => 0xE2,
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(OpCode::Model),
            0x01 => Some(OpCode::Serial),
            0x02 => Some(OpCode::FwVer),
            0x03 => Some(OpCode::DevType),
            0x04 => Some(OpCode::ChanCt),
            0x05 => Some(OpCode::Identify),
            0x0C => Some(OpCode::Save),
            0x0D => Some(OpCode::Recall),
            0x0E => Some(OpCode::Passwd),
            0x0F => Some(OpCode::Revert),
            0x10 => Some(OpCode::Alarm),
            0x11 => Some(OpCode::Setpoint),
            0x12 => Some(OpCode::Limit),
            0x13 => Some(OpCode::Mode),
            0x14 => Some(OpCode::Track),
            0x15 => Some(OpCode::IMon),
            0x16 => Some(OpCode::PMon),
            0x17 => Some(OpCode::Enable),
            0x19 => Some(OpCode::Rpd),
            0xE2 => Some(OpCode::CalIScale),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            OpCode::Model => "MODEL",
            OpCode::Serial => "SERIAL",
            OpCode::FwVer => "FWVER",
            OpCode::DevType => "DEVTYPE",
            OpCode::ChanCt => "CHANCT",
            OpCode::Identify => "IDENTIFY",
            OpCode::Save => "SAVE",
            OpCode::Recall => "RECALL",
            OpCode::Passwd => "PASSWD",
            OpCode::Revert => "REVERT",
            OpCode::Alarm => "ALARM",
            OpCode::Setpoint => "SETPOINT",
            OpCode::Limit => "LIMIT",
            OpCode::Mode => "MODE",
            OpCode::Track => "TRACK",
            OpCode::IMon => "IMON",
            OpCode::PMon => "PMON",
            OpCode::Enable => "ENABLE",
            OpCode::Rpd => "RPD",
            OpCode::CalIScale => "CAL_ISCALE",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        let upper = token.to_ascii_uppercase();
        OpCode::ALL.iter().copied().find(|op| op.token() == upper)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Device-reported result status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndCode {
    /// No error.
    Ok,
    /// Device type field incorrect.
    DevType,
    /// Channel number out of range.
    Channel,
    /// Op-type not supported.
    OpType,
    /// Op-code not implemented.
    NotImpl,
    /// Command received but not completed; data field is unreliable.
    Pending,
    /// Device busy, operation not performed.
    Busy,
    /// Data field content invalid for the op-code.
    Data,
    /// Requested operation outside the configured safety specs.
    Safety,
    /// Operation only available in calibration mode.
    CalMode,
}

impl EndCode {
    pub fn wire(&self) -> u8 {
        match self {
            EndCode::Ok => 0,
            EndCode::DevType => 1,
            EndCode::Channel => 2,
            EndCode::OpType => 3,
            EndCode::NotImpl => 4,
            EndCode::Pending => 5,
            EndCode::Busy => 6,
            EndCode::Data => 7,
            EndCode::Safety => 8,
            EndCode::CalMode => 9,
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(EndCode::Ok),
            1 => Some(EndCode::DevType),
            2 => Some(EndCode::Channel),
            3 => Some(EndCode::OpType),
            4 => Some(EndCode::NotImpl),
            5 => Some(EndCode::Pending),
            6 => Some(EndCode::Busy),
            7 => Some(EndCode::Data),
            8 => Some(EndCode::Safety),
            9 => Some(EndCode::CalMode),
            _ => None,
        }
    }

    /// Short mnemonic, matching the protocol documentation.
    pub fn token(&self) -> &'static str {
        match self {
            EndCode::Ok => "OK",
            EndCode::DevType => "DEVTYPE",
            EndCode::Channel => "CHANNEL",
            EndCode::OpType => "OPTYPE",
            EndCode::NotImpl => "NOTIMPL",
            EndCode::Pending => "PENDING",
            EndCode::Busy => "BUSY",
            EndCode::Data => "DATA",
            EndCode::Safety => "SAFETY",
            EndCode::CalMode => "CALMODE",
        }
    }

    /// Human-readable description of the condition.
    pub fn description(&self) -> &'static str {
        match self {
            EndCode::Ok => "no error",
            EndCode::DevType => "incorrect device type",
            EndCode::Channel => "channel number out of range",
            EndCode::OpType => "op-type not supported",
            EndCode::Pending => "pending, command received but not completed",
            EndCode::NotImpl => "op-code not implemented",
            EndCode::Busy => "device busy, operation not performed",
            EndCode::Data => "data field content invalid for op-code",
            EndCode::Safety => "requested operation not within safety specs",
            EndCode::CalMode => "operation only available in calibration mode",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, EndCode::Ok)
    }
}

impl fmt::Display for EndCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.token(), self.description())
    }
}

/// Index into the alarm flag bit vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alarm {
    /// Output status; on only when XEN, LEN, and REN are all on.
    Out,
    /// External enable: NT pin on connector J102 pulled low.
    Xen,
    /// Local enable: toggle switch on the board PCB.
    Len,
    /// Remote enable: state of the ENABLE register.
    Ren,
    /// Feedback mode of channel 1 (off: CC, on: CP).
    Mode1,
    /// Feedback mode of channel 2 (off: CC, on: CP).
    Mode2,
    /// Parallel (tracking) mode state.
    Para,
    /// Identify flag active.
    Ident,
    /// Write to non-volatile memory in progress.
    Write,
    /// Device is in calibration mode.
    CalMode,
}

impl Alarm {
    /// All flags, in bit-vector order.
    pub const ALL: [Alarm; NUM_ALARMS] = [
        Alarm::Out,
        Alarm::Xen,
        Alarm::Len,
        Alarm::Ren,
        Alarm::Mode1,
        Alarm::Mode2,
        Alarm::Para,
        Alarm::Ident,
        Alarm::Write,
        Alarm::CalMode,
    ];

    /// Position of this flag within the alarm data field.
    pub fn index(&self) -> usize {
        match self {
            Alarm::Out => 0,
            Alarm::Xen => 1,
            Alarm::Len => 2,
            Alarm::Ren => 3,
            Alarm::Mode1 => 4,
            Alarm::Mode2 => 5,
            Alarm::Para => 6,
            Alarm::Ident => 7,
            Alarm::Write => 8,
            Alarm::CalMode => 9,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Alarm::Out => "OUT",
            Alarm::Xen => "XEN",
            Alarm::Len => "LEN",
            Alarm::Ren => "REN",
            Alarm::Mode1 => "MODE1",
            Alarm::Mode2 => "MODE2",
            Alarm::Para => "PARA",
            Alarm::Ident => "IDENT",
            Alarm::Write => "WRITE",
            Alarm::CalMode => "CALMODE",
        }
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Laser driver feedback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackMode {
    /// Constant current regulation.
    ConstantCurrent,
    /// Constant power regulation (photodiode feedback).
    ConstantPower,
}

impl fmt::Display for FeedbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackMode::ConstantCurrent => write!(f, "CC"),
            FeedbackMode::ConstantPower => write!(f, "CP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_wire_round_trip() {
        for chan in ChannelId::ALL {
            assert_eq!(ChannelId::from_wire(chan.wire()), Some(chan));
        }
        assert_eq!(ChannelId::from_wire(3), None);
    }

    #[test]
    fn channel_token_round_trip() {
        for chan in ChannelId::ALL {
            assert_eq!(ChannelId::from_token(chan.token()), Some(chan));
        }
        // Case-insensitive.
        assert_eq!(ChannelId::from_token("ld1"), Some(ChannelId::Ld1));
        assert_eq!(ChannelId::from_token("Status"), Some(ChannelId::Status));
        assert_eq!(ChannelId::from_token("LD3"), None);
    }

    #[test]
    fn op_type_round_trips() {
        for op in [OpType::Read, OpType::Write, OpType::Min, OpType::Max] {
            assert_eq!(OpType::from_wire(op.wire()), Some(op));
            assert_eq!(OpType::from_token(op.token()), Some(op));
        }
        assert_eq!(OpType::from_wire(0), None);
        assert_eq!(OpType::from_wire(5), None);
        assert_eq!(OpType::from_token("PEEK"), None);
    }

    #[test]
    fn op_code_round_trips() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::from_wire(op.wire()), Some(op));
            assert_eq!(OpCode::from_token(op.token()), Some(op));
        }
        assert_eq!(OpCode::from_wire(0x06), None);
        assert_eq!(OpCode::from_token("FREQUENCY"), None);
    }

    #[test]
    fn op_code_wire_values_match_datasheet() {
        assert_eq!(OpCode::Model.wire(), 0x00);
        assert_eq!(OpCode::Alarm.wire(), 0x10);
        assert_eq!(OpCode::Setpoint.wire(), 0x11);
        assert_eq!(OpCode::Limit.wire(), 0x12);
        assert_eq!(OpCode::Enable.wire(), 0x17);
        assert_eq!(OpCode::Rpd.wire(), 0x19);
        assert_eq!(OpCode::CalIScale.wire(), 0xE2);
    }

    #[test]
    fn end_code_round_trip() {
        for byte in 0..=9u8 {
            let code = EndCode::from_wire(byte).unwrap();
            assert_eq!(code.wire(), byte);
        }
        assert_eq!(EndCode::from_wire(10), None);
        assert!(EndCode::Ok.is_ok());
        assert!(!EndCode::Busy.is_ok());
    }

    #[test]
    fn end_code_display_includes_description() {
        let s = EndCode::Safety.to_string();
        assert!(s.contains("SAFETY"));
        assert!(s.contains("safety specs"));
    }

    #[test]
    fn alarm_indices_are_dense() {
        for (i, alarm) in Alarm::ALL.iter().enumerate() {
            assert_eq!(alarm.index(), i);
        }
    }

    #[test]
    fn flag_bytes_are_ascii_digits() {
        assert_eq!(FLAG_OFF, 0x30);
        assert_eq!(FLAG_ON, 0x31);
    }

    #[test]
    fn packet_lengths() {
        assert_eq!(CMD_PACKET_LEN, 20);
        assert_eq!(RSP_PACKET_LEN, 21);
        // Header (4 out / 5 in) plus data must fit the fixed lengths.
        assert_eq!(4 + MAX_DATA_LEN, CMD_PACKET_LEN);
        assert_eq!(5 + MAX_DATA_LEN, RSP_PACKET_LEN);
    }
}
