//! In-process simulated FL593FL board.
//!
//! [`SimTransport`] implements [`Transport`] over a synthetic board with
//! real register state: setpoints and limits persist, the enable chain
//! feeds the alarm vector, and monitor readings are derived from the
//! setpoint with a little measurement noise. It lets integration tests
//! and examples run the full driver stack without hardware.
//!
//! Semantic errors answer with proper end codes (NOTIMPL, DATA, SAFETY,
//! CALMODE). Byte-level garbage gets no response at all, which is what a
//! real board's wedged pipe looks like to the host.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::Duration;

use fl593_core::error::{Error, Result};
use fl593_core::transport::Transport;
use fl593_core::types::{
    ChannelId, EndCode, OpCode, OpType, DEV_TYPE, FLAG_OFF, FLAG_ON, NUM_ALARMS,
};
use fl593_driver::protocol::{CommandPacket, ResponsePacket};

/// Hardware current limit ceiling of the simulated board, in amperes.
const LIMIT_CEILING: f64 = 0.250;

/// Relative measurement noise applied to monitor readings.
const MONITOR_JITTER: f64 = 0.01;

#[derive(Debug, Clone)]
struct SimLaser {
    /// Setpoint in amperes.
    setpoint: f64,
    /// Current limit in amperes.
    limit: f64,
    /// Constant-power mode flag (off means constant current).
    cp_mode: bool,
    /// Photodiode feedback resistor in kOhm.
    rpd: f64,
}

impl Default for SimLaser {
    fn default() -> Self {
        SimLaser {
            setpoint: 0.0,
            limit: 0.050,
            cp_mode: false,
            rpd: 10.0,
        }
    }
}

/// A simulated board behind the [`Transport`] trait.
pub struct SimTransport {
    connected: bool,
    /// Response bytes queued for `receive()`.
    outbox: VecDeque<u8>,
    rng: StdRng,
    serial: String,
    remote_enable: bool,
    /// Front-panel toggle switch; on by default so enabling remotely
    /// lights the output.
    local_enable: bool,
    /// NT interlock pin; closed by default.
    external_enable: bool,
    identify: bool,
    lasers: [SimLaser; 2],
}

impl SimTransport {
    pub fn new() -> Self {
        Self::seeded(rand::random())
    }

    /// A simulator with a deterministic noise sequence.
    pub fn seeded(seed: u64) -> Self {
        SimTransport {
            connected: true,
            outbox: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
            serial: "SIM90001".to_string(),
            remote_enable: false,
            local_enable: true,
            external_enable: true,
            identify: false,
            lasers: [SimLaser::default(), SimLaser::default()],
        }
    }

    /// Flip the simulated front-panel enable switch.
    pub fn set_local_enable(&mut self, on: bool) {
        self.local_enable = on;
    }

    /// Open or close the simulated NT interlock pin.
    pub fn set_external_enable(&mut self, on: bool) {
        self.external_enable = on;
    }

    fn output_on(&self) -> bool {
        self.external_enable && self.local_enable && self.remote_enable
    }

    fn alarm_vector(&self) -> Vec<u8> {
        let flags = [
            self.output_on(),
            self.external_enable,
            self.local_enable,
            self.remote_enable,
            self.lasers[0].cp_mode,
            self.lasers[1].cp_mode,
            false, // PARA
            self.identify,
            false, // WRITE
            false, // CALMODE
        ];
        debug_assert_eq!(flags.len(), NUM_ALARMS);
        flags
            .iter()
            .map(|&on| if on { FLAG_ON } else { FLAG_OFF })
            .collect()
    }

    fn respond(&mut self, cmd: &CommandPacket, end_code: EndCode, data: Vec<u8>) {
        let response = ResponsePacket {
            dev_type: DEV_TYPE,
            channel: cmd.channel,
            op_type: cmd.op_type,
            op_code: cmd.op_code,
            end_code,
            data,
        };
        // The data fields built here always fit the fixed packet.
        if let Ok(bytes) = response.encode() {
            self.outbox.extend(bytes);
        }
    }

    fn handle(&mut self, cmd: CommandPacket) {
        match cmd.channel {
            ChannelId::Status => self.handle_status(cmd),
            ChannelId::Ld1 => self.handle_laser(cmd, 0),
            ChannelId::Ld2 => self.handle_laser(cmd, 1),
        }
    }

    fn handle_status(&mut self, cmd: CommandPacket) {
        use OpCode::*;
        match (cmd.op_type, cmd.op_code) {
            (OpType::Read, Model) => self.respond(&cmd, EndCode::Ok, b"FL593FL".to_vec()),
            (OpType::Read, Serial) => {
                let serial = self.serial.clone().into_bytes();
                self.respond(&cmd, EndCode::Ok, serial)
            }
            (OpType::Read, FwVer) => self.respond(&cmd, EndCode::Ok, b"2.0.2-sim".to_vec()),
            (OpType::Read, DevType) => self.respond(&cmd, EndCode::Ok, b"0".to_vec()),
            (OpType::Read, ChanCt) => self.respond(&cmd, EndCode::Ok, b"2".to_vec()),
            (OpType::Read, Alarm) => {
                let vector = self.alarm_vector();
                self.respond(&cmd, EndCode::Ok, vector)
            }
            (OpType::Read, Enable) => {
                let flag = if self.remote_enable { FLAG_ON } else { FLAG_OFF };
                self.respond(&cmd, EndCode::Ok, vec![flag])
            }
            (OpType::Write, Enable) => {
                self.remote_enable = matches!(cmd.data.first(), Some(&b) if b != FLAG_OFF && b != 0);
                let flag = if self.remote_enable { FLAG_ON } else { FLAG_OFF };
                self.respond(&cmd, EndCode::Ok, vec![flag])
            }
            (OpType::Read, Identify) => {
                let flag = if self.identify { FLAG_ON } else { FLAG_OFF };
                self.respond(&cmd, EndCode::Ok, vec![flag])
            }
            (OpType::Write, Identify) => {
                self.identify = matches!(cmd.data.first(), Some(&b) if b != FLAG_OFF && b != 0);
                self.respond(&cmd, EndCode::Ok, Vec::new())
            }
            // Persistence is a no-op for the simulator.
            (OpType::Write, Save) | (OpType::Write, Recall) => {
                self.respond(&cmd, EndCode::Ok, Vec::new())
            }
            (_, Passwd) | (_, Revert) | (_, CalIScale) => {
                self.respond(&cmd, EndCode::CalMode, Vec::new())
            }
            (OpType::Write, Model) | (OpType::Write, FwVer) | (OpType::Write, DevType)
            | (OpType::Write, ChanCt) | (OpType::Write, Alarm) => {
                self.respond(&cmd, EndCode::OpType, Vec::new())
            }
            _ => self.respond(&cmd, EndCode::NotImpl, Vec::new()),
        }
    }

    fn handle_laser(&mut self, cmd: CommandPacket, index: usize) {
        use OpCode::*;

        let parse_value = |data: &[u8]| -> Option<f64> {
            std::str::from_utf8(data)
                .ok()
                .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok())
        };

        match (cmd.op_type, cmd.op_code) {
            (OpType::Read, Setpoint) => {
                let data = format!("{:.5}", self.lasers[index].setpoint).into_bytes();
                self.respond(&cmd, EndCode::Ok, data)
            }
            (OpType::Read, Limit) => {
                let data = format!("{:.5}", self.lasers[index].limit).into_bytes();
                self.respond(&cmd, EndCode::Ok, data)
            }
            (OpType::Read, IMon) => {
                let value = self.monitor_reading(index);
                self.respond(&cmd, EndCode::Ok, format!("{:.5}", value).into_bytes())
            }
            (OpType::Read, PMon) => {
                // Simple proportional photodiode model.
                let value = self.monitor_reading(index) * 0.8;
                self.respond(&cmd, EndCode::Ok, format!("{:.5}", value).into_bytes())
            }
            (OpType::Read, Mode) => {
                let flag = if self.lasers[index].cp_mode { FLAG_ON } else { FLAG_OFF };
                self.respond(&cmd, EndCode::Ok, vec![flag])
            }
            (OpType::Read, Rpd) => {
                let data = format!("{:.3}", self.lasers[index].rpd).into_bytes();
                self.respond(&cmd, EndCode::Ok, data)
            }
            (OpType::Read, Track) => self.respond(&cmd, EndCode::Ok, vec![FLAG_OFF]),
            (OpType::Min, Setpoint) | (OpType::Min, Limit) => {
                self.respond(&cmd, EndCode::Ok, b"0.00000".to_vec())
            }
            (OpType::Max, Limit) => {
                self.respond(&cmd, EndCode::Ok, format!("{:.5}", LIMIT_CEILING).into_bytes())
            }
            (OpType::Max, Setpoint) => {
                let data = format!("{:.5}", self.lasers[index].limit).into_bytes();
                self.respond(&cmd, EndCode::Ok, data)
            }
            (OpType::Write, Setpoint) => match parse_value(&cmd.data) {
                None => self.respond(&cmd, EndCode::Data, Vec::new()),
                Some(value) if !(0.0..=LIMIT_CEILING).contains(&value) => {
                    self.respond(&cmd, EndCode::Safety, Vec::new())
                }
                Some(value) => {
                    self.lasers[index].setpoint = value;
                    let echo = format!("{:.5}", value).into_bytes();
                    self.respond(&cmd, EndCode::Ok, echo)
                }
            },
            (OpType::Write, Limit) => match parse_value(&cmd.data) {
                None => self.respond(&cmd, EndCode::Data, Vec::new()),
                Some(value) if !(0.0..=LIMIT_CEILING).contains(&value) => {
                    self.respond(&cmd, EndCode::Safety, Vec::new())
                }
                Some(value) => {
                    self.lasers[index].limit = value;
                    let echo = format!("{:.5}", value).into_bytes();
                    self.respond(&cmd, EndCode::Ok, echo)
                }
            },
            (OpType::Write, Mode) => {
                self.lasers[index].cp_mode =
                    matches!(cmd.data.first(), Some(&b) if b != FLAG_OFF && b != 0);
                self.respond(&cmd, EndCode::Ok, Vec::new())
            }
            (OpType::Write, Rpd) => match parse_value(&cmd.data) {
                None => self.respond(&cmd, EndCode::Data, Vec::new()),
                Some(value) => {
                    self.lasers[index].rpd = value;
                    self.respond(&cmd, EndCode::Ok, Vec::new())
                }
            },
            // Identity registers live on the status channel only.
            (_, Model) | (_, Serial) | (_, FwVer) | (_, DevType) | (_, ChanCt) => {
                self.respond(&cmd, EndCode::NotImpl, Vec::new())
            }
            (_, CalIScale) => self.respond(&cmd, EndCode::CalMode, Vec::new()),
            _ => self.respond(&cmd, EndCode::NotImpl, Vec::new()),
        }
    }

    /// Current monitor model: tracks the setpoint with noise while the
    /// output is on, clamped at the limit; dark otherwise.
    fn monitor_reading(&mut self, index: usize) -> f64 {
        if !self.output_on() {
            return 0.0;
        }
        let laser = &self.lasers[index];
        let noisy =
            laser.setpoint * (1.0 + self.rng.gen_range(-MONITOR_JITTER..=MONITOR_JITTER));
        noisy.clamp(0.0, laser.limit)
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        match CommandPacket::decode(data) {
            Ok(cmd) => self.handle(cmd),
            Err(e) => {
                // Garbage on the pipe; the board would stay silent.
                tracing::debug!(error = %e, "Simulator ignoring undecodable command");
            }
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.outbox.is_empty() {
            return Err(Error::Timeout);
        }
        let n = buf.len().min(self.outbox.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.outbox.pop_front().unwrap_or(0);
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.outbox.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fl593_core::types::RSP_PACKET_LEN;

    async fn exchange(sim: &mut SimTransport, line: &str) -> ResponsePacket {
        let bytes = fl593_driver::protocol::encode_command(line).unwrap();
        sim.send(&bytes).await.unwrap();
        let mut buf = [0u8; RSP_PACKET_LEN];
        let n = sim.receive(&mut buf, Duration::from_millis(100)).await.unwrap();
        ResponsePacket::decode(&buf[..n]).unwrap()
    }

    #[tokio::test]
    async fn identity_reads() {
        let mut sim = SimTransport::seeded(1);
        assert_eq!(exchange(&mut sim, "STATUS READ MODEL").await.data_str(), "FL593FL");
        assert_eq!(exchange(&mut sim, "STATUS READ CHANCT").await.data_str(), "2");
    }

    #[tokio::test]
    async fn setpoint_write_persists_and_echoes() {
        let mut sim = SimTransport::seeded(1);
        let response = exchange(&mut sim, "LD1 WRITE SETPOINT 0.040").await;
        assert_eq!(response.end_code, EndCode::Ok);
        let read = exchange(&mut sim, "LD1 READ SETPOINT").await;
        assert!((read.data_f64().unwrap() - 0.040).abs() < 1e-9);
        // The other channel is untouched.
        let other = exchange(&mut sim, "LD2 READ SETPOINT").await;
        assert_eq!(other.data_f64().unwrap(), 0.0);
    }

    #[tokio::test]
    async fn out_of_range_write_is_a_safety_error() {
        let mut sim = SimTransport::seeded(1);
        let response = exchange(&mut sim, "LD1 WRITE SETPOINT 0.900").await;
        assert_eq!(response.end_code, EndCode::Safety);
        let response = exchange(&mut sim, "LD1 WRITE LIMIT -0.1").await;
        assert_eq!(response.end_code, EndCode::Safety);
    }

    #[tokio::test]
    async fn non_numeric_write_is_a_data_error() {
        let mut sim = SimTransport::seeded(1);
        let response = exchange(&mut sim, "LD1 WRITE SETPOINT banana").await;
        assert_eq!(response.end_code, EndCode::Data);
    }

    #[tokio::test]
    async fn monitor_is_dark_until_the_enable_chain_closes() {
        let mut sim = SimTransport::seeded(7);
        exchange(&mut sim, "LD1 WRITE LIMIT 0.100").await;
        exchange(&mut sim, "LD1 WRITE SETPOINT 0.050").await;

        // Remote enable still off.
        let dark = exchange(&mut sim, "LD1 READ IMON").await;
        assert_eq!(dark.data_f64().unwrap(), 0.0);

        exchange(&mut sim, "STATUS WRITE ENABLE 1").await;
        let lit = exchange(&mut sim, "LD1 READ IMON").await;
        let value = lit.data_f64().unwrap();
        assert!(value > 0.045 && value < 0.055, "IMON = {}", value);
    }

    #[tokio::test]
    async fn alarm_vector_tracks_enable_chain() {
        let mut sim = SimTransport::seeded(1);
        let off = exchange(&mut sim, "STATUS READ ALARM").await.data_alarms().unwrap();
        assert!(!off[0]); // OUT
        assert!(off[1]); // XEN
        assert!(off[2]); // LEN
        assert!(!off[3]); // REN

        exchange(&mut sim, "STATUS WRITE ENABLE 1").await;
        let on = exchange(&mut sim, "STATUS READ ALARM").await.data_alarms().unwrap();
        assert!(on[0]);
        assert!(on[3]);

        // Opening the interlock kills the output regardless of REN.
        sim.set_external_enable(false);
        let tripped = exchange(&mut sim, "STATUS READ ALARM").await.data_alarms().unwrap();
        assert!(!tripped[0]);
        assert!(!tripped[1]);
    }

    #[tokio::test]
    async fn calibration_registers_demand_cal_mode() {
        let mut sim = SimTransport::seeded(1);
        let response = exchange(&mut sim, "LD1 READ CAL_ISCALE").await;
        assert_eq!(response.end_code, EndCode::CalMode);
    }

    #[tokio::test]
    async fn garbage_gets_no_response() {
        let mut sim = SimTransport::seeded(1);
        sim.send(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).await.unwrap();
        let mut buf = [0u8; RSP_PACKET_LEN];
        let result = sim.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
