//! WEI packet encoder/decoder and the text command grammar.
//!
//! The FL593FL speaks a fixed-format binary register protocol over its
//! bulk endpoints. This module handles the pure byte-level encoding and
//! decoding of packets plus the interpretation of response data fields.
//!
//! # Packet formats
//!
//! ```text
//! command  (20 bytes):  <dev_type> <channel> <op_type> <op_code> <data: 16>
//! response (21 bytes):  <dev_type> <channel> <op_type> <op_code> <end_code> <data: 16>
//! ```
//!
//! All header fields are single bytes (the vendor documentation describes
//! 2-byte fields; real devices use 1). The data field is ASCII, zero
//! padded on the right; flags are the literal characters `'0'` and `'1'`,
//! numeric values are decimal strings.

use bytes::{BufMut, BytesMut};
use fl593_core::error::{Error, Result};
use fl593_core::types::{
    Alarm, ChannelId, EndCode, OpCode, OpType, CMD_PACKET_LEN, DEV_TYPE, FLAG_OFF, MAX_DATA_LEN,
    NUM_ALARMS, RSP_PACKET_LEN,
};

/// A host-to-device command packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    /// Target channel.
    pub channel: ChannelId,
    /// Operation kind.
    pub op_type: OpType,
    /// Target register.
    pub op_code: OpCode,
    /// Data field payload, at most [`MAX_DATA_LEN`] bytes. Empty for
    /// reads.
    pub data: Vec<u8>,
}

impl CommandPacket {
    /// A READ of `op_code` on `channel`.
    pub fn read(channel: ChannelId, op_code: OpCode) -> Self {
        CommandPacket {
            channel,
            op_type: OpType::Read,
            op_code,
            data: Vec::new(),
        }
    }

    /// A WRITE of `data` to `op_code` on `channel`.
    pub fn write(channel: ChannelId, op_code: OpCode, data: impl Into<Vec<u8>>) -> Self {
        CommandPacket {
            channel,
            op_type: OpType::Write,
            op_code,
            data: data.into(),
        }
    }

    /// A MIN query of `op_code` on `channel`.
    pub fn min(channel: ChannelId, op_code: OpCode) -> Self {
        CommandPacket {
            channel,
            op_type: OpType::Min,
            op_code,
            data: Vec::new(),
        }
    }

    /// A MAX query of `op_code` on `channel`.
    pub fn max(channel: ChannelId, op_code: OpCode) -> Self {
        CommandPacket {
            channel,
            op_type: OpType::Max,
            op_code,
            data: Vec::new(),
        }
    }

    /// Encode into the fixed 20-byte wire format.
    ///
    /// Fails with [`Error::InvalidCommand`] if the data field exceeds
    /// [`MAX_DATA_LEN`] bytes; a silently truncated setpoint would be a
    /// safety hazard.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(Error::InvalidCommand(format!(
                "data field is {} bytes, maximum is {}",
                self.data.len(),
                MAX_DATA_LEN
            )));
        }
        let mut buf = BytesMut::with_capacity(CMD_PACKET_LEN);
        buf.put_u8(DEV_TYPE);
        buf.put_u8(self.channel.wire());
        buf.put_u8(self.op_type.wire());
        buf.put_u8(self.op_code.wire());
        buf.put_slice(&self.data);
        buf.resize(CMD_PACKET_LEN, 0);
        Ok(buf.to_vec())
    }

    /// Decode a command packet from raw bytes.
    ///
    /// Used by simulated devices; a real board never sends commands to
    /// the host. Accepts any buffer of at least 4 bytes and treats the
    /// remainder (up to the fixed length) as the data field.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::MalformedPacket(format!(
                "command truncated at {} bytes, header needs 4",
                buf.len()
            )));
        }
        if buf[0] != DEV_TYPE {
            return Err(Error::MalformedPacket(format!(
                "unknown device type byte 0x{:02x}",
                buf[0]
            )));
        }
        let channel = ChannelId::from_wire(buf[1]).ok_or_else(|| {
            Error::MalformedPacket(format!("unknown channel byte 0x{:02x}", buf[1]))
        })?;
        let op_type = OpType::from_wire(buf[2]).ok_or_else(|| {
            Error::MalformedPacket(format!("unknown op-type byte 0x{:02x}", buf[2]))
        })?;
        let op_code = OpCode::from_wire(buf[3]).ok_or_else(|| {
            Error::MalformedPacket(format!("unknown op-code byte 0x{:02x}", buf[3]))
        })?;
        let end = buf.len().min(CMD_PACKET_LEN);
        Ok(CommandPacket {
            channel,
            op_type,
            op_code,
            data: buf[4..end].to_vec(),
        })
    }
}

/// A device-to-host response packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    /// Echoed device type.
    pub dev_type: u8,
    /// Echoed channel.
    pub channel: ChannelId,
    /// Echoed operation kind.
    pub op_type: OpType,
    /// Echoed register.
    pub op_code: OpCode,
    /// Device-reported result status.
    pub end_code: EndCode,
    /// Data field, zero padded on the wire; kept verbatim here.
    pub data: Vec<u8>,
}

impl ResponsePacket {
    /// Decode a response packet from raw bytes.
    ///
    /// Requires at least the 5-byte header; the data field is whatever
    /// follows it. Unknown header bytes fail with
    /// [`Error::MalformedPacket`] naming the offending byte.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 5 {
            return Err(Error::MalformedPacket(format!(
                "response truncated at {} bytes, header needs 5",
                buf.len()
            )));
        }
        let channel = ChannelId::from_wire(buf[1]).ok_or_else(|| {
            Error::MalformedPacket(format!("unknown channel byte 0x{:02x}", buf[1]))
        })?;
        let op_type = OpType::from_wire(buf[2]).ok_or_else(|| {
            Error::MalformedPacket(format!("unknown op-type byte 0x{:02x}", buf[2]))
        })?;
        let op_code = OpCode::from_wire(buf[3]).ok_or_else(|| {
            Error::MalformedPacket(format!("unknown op-code byte 0x{:02x}", buf[3]))
        })?;
        let end_code = EndCode::from_wire(buf[4]).ok_or_else(|| {
            Error::MalformedPacket(format!("unknown end-code byte 0x{:02x}", buf[4]))
        })?;
        let end = buf.len().min(RSP_PACKET_LEN);
        Ok(ResponsePacket {
            dev_type: buf[0],
            channel,
            op_type,
            op_code,
            end_code,
            data: buf[5..end].to_vec(),
        })
    }

    /// Encode into the fixed 21-byte wire format.
    ///
    /// Used by simulated devices.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(Error::InvalidCommand(format!(
                "data field is {} bytes, maximum is {}",
                self.data.len(),
                MAX_DATA_LEN
            )));
        }
        let mut buf = BytesMut::with_capacity(RSP_PACKET_LEN);
        buf.put_u8(self.dev_type);
        buf.put_u8(self.channel.wire());
        buf.put_u8(self.op_type.wire());
        buf.put_u8(self.op_code.wire());
        buf.put_u8(self.end_code.wire());
        buf.put_slice(&self.data);
        buf.resize(RSP_PACKET_LEN, 0);
        Ok(buf.to_vec())
    }

    /// The data field as a string, with zero padding trimmed.
    pub fn data_str(&self) -> String {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        String::from_utf8_lossy(&self.data[..end]).into_owned()
    }

    /// The data field parsed as a decimal number.
    pub fn data_f64(&self) -> Result<f64> {
        let s = self.data_str();
        s.trim().parse::<f64>().map_err(|_| {
            Error::InvalidData(format!("{} data field is not numeric: {:?}", self.op_code, s))
        })
    }

    /// The first data byte as a flag. Any byte other than `'0'` counts
    /// as on, matching device behavior.
    pub fn data_flag(&self) -> bool {
        matches!(self.data.first(), Some(&b) if b != FLAG_OFF && b != 0)
    }

    /// The data field as the alarm bit vector.
    ///
    /// Fails with [`Error::InvalidData`] if fewer than [`NUM_ALARMS`]
    /// flag bytes are present.
    pub fn data_alarms(&self) -> Result<[bool; NUM_ALARMS]> {
        if self.data.len() < NUM_ALARMS {
            return Err(Error::InvalidData(format!(
                "alarm field has {} bytes, expected {}",
                self.data.len(),
                NUM_ALARMS
            )));
        }
        let mut flags = [false; NUM_ALARMS];
        for (flag, &b) in flags.iter_mut().zip(self.data.iter()) {
            *flag = b != FLAG_OFF;
        }
        Ok(flags)
    }

    /// Convenience: look up one alarm flag from the data field.
    pub fn alarm(&self, alarm: Alarm) -> Result<bool> {
        Ok(self.data_alarms()?[alarm.index()])
    }
}

/// Parse a whitespace-separated text command into a [`CommandPacket`].
///
/// The grammar is `<channel> <op_type> <op_code> [data...]`, e.g.
/// `"LD1 WRITE SETPOINT 0.05"`. Header tokens are case-insensitive; data
/// tokens are passed through verbatim (joined with single spaces if more
/// than one).
pub fn parse_command(line: &str) -> Result<CommandPacket> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(Error::InvalidCommand(format!(
            "expected '<channel> <op_type> <op_code> [data]', got {} tokens in {:?}",
            tokens.len(),
            line
        )));
    }
    let channel = ChannelId::from_token(tokens[0])
        .ok_or_else(|| Error::InvalidCommand(format!("unknown channel {:?}", tokens[0])))?;
    let op_type = OpType::from_token(tokens[1])
        .ok_or_else(|| Error::InvalidCommand(format!("unknown op-type {:?}", tokens[1])))?;
    let op_code = OpCode::from_token(tokens[2])
        .ok_or_else(|| Error::InvalidCommand(format!("unknown op-code {:?}", tokens[2])))?;
    let data = tokens[3..].join(" ").into_bytes();
    Ok(CommandPacket {
        channel,
        op_type,
        op_code,
        data,
    })
}

/// Parse and encode a text command in one step.
pub fn encode_command(line: &str) -> Result<Vec<u8>> {
    parse_command(line)?.encode()
}
