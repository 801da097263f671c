//! Typed wrapper for a laser driver channel.
//!
//! [`LaserChannel`] exposes one driver channel's monitors, setpoint,
//! limit, and feedback mode. The device works in amperes on the wire;
//! this layer converts to milliamps at the boundary, which is the unit
//! everything host-side displays and logs.

use tracing::warn;

use fl593_core::error::{Error, Result};
use fl593_core::types::{ChannelId, FeedbackMode, OpCode};

use crate::channel::RegisterChannel;

/// Wire values are amperes, host values are milliamps.
const MA_PER_A: f64 = 1000.0;

/// One refreshed view of a laser channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserSnapshot {
    pub mode: FeedbackMode,
    pub current_monitor_ma: f64,
    pub power_monitor_ma: f64,
    pub limit_ma: f64,
    pub setpoint_ma: f64,
}

/// A single laser driver channel (LD1 or LD2).
pub struct LaserChannel {
    chan: RegisterChannel,
}

impl LaserChannel {
    pub fn new(chan: RegisterChannel) -> Self {
        debug_assert_ne!(chan.id(), ChannelId::Status);
        LaserChannel { chan }
    }

    /// This channel's protocol identity.
    pub fn id(&self) -> ChannelId {
        self.chan.id()
    }

    /// Current feedback mode.
    pub async fn mode(&self) -> Result<FeedbackMode> {
        let response = self.chan.read(OpCode::Mode).await?;
        Ok(if response.data_flag() {
            FeedbackMode::ConstantPower
        } else {
            FeedbackMode::ConstantCurrent
        })
    }

    /// Switching the feedback mode is not supported.
    ///
    /// The register's write format is undocumented and an accidental CC
    /// to CP flip can drive the diode far past its rating, so the
    /// library refuses rather than guess.
    pub async fn set_mode(&self, _mode: FeedbackMode) -> Result<()> {
        Err(Error::Unsupported(
            "changing the feedback mode from the host".into(),
        ))
    }

    /// Current monitor reading in mA.
    pub async fn current_monitor_ma(&self) -> Result<f64> {
        Ok(self.chan.read(OpCode::IMon).await?.data_f64()? * MA_PER_A)
    }

    /// Power monitor reading in mA (photodiode current).
    pub async fn power_monitor_ma(&self) -> Result<f64> {
        Ok(self.chan.read(OpCode::PMon).await?.data_f64()? * MA_PER_A)
    }

    /// Current limit in mA.
    pub async fn limit_ma(&self) -> Result<f64> {
        Ok(self.chan.read(OpCode::Limit).await?.data_f64()? * MA_PER_A)
    }

    /// Setpoint in mA (CC mode) or photodiode mA (CP mode).
    pub async fn setpoint_ma(&self) -> Result<f64> {
        Ok(self.chan.read(OpCode::Setpoint).await?.data_f64()? * MA_PER_A)
    }

    /// Smallest accepted setpoint in mA.
    pub async fn setpoint_min_ma(&self) -> Result<f64> {
        Ok(self.chan.min(OpCode::Setpoint).await?.data_f64()? * MA_PER_A)
    }

    /// Largest accepted setpoint in mA.
    pub async fn setpoint_max_ma(&self) -> Result<f64> {
        Ok(self.chan.max(OpCode::Setpoint).await?.data_f64()? * MA_PER_A)
    }

    /// Largest accepted limit in mA (the hardware ceiling).
    pub async fn limit_max_ma(&self) -> Result<f64> {
        Ok(self.chan.max(OpCode::Limit).await?.data_f64()? * MA_PER_A)
    }

    /// Photodiode feedback resistor in kOhm.
    pub async fn rpd_kohm(&self) -> Result<f64> {
        self.chan.read(OpCode::Rpd).await?.data_f64()
    }

    /// Set the photodiode feedback resistor value in kOhm.
    pub async fn set_rpd_kohm(&self, kohm: f64) -> Result<()> {
        if !kohm.is_finite() || kohm < 0.0 {
            return Err(Error::InvalidParameter(format!("RPD {} kOhm", kohm)));
        }
        self.chan
            .write(OpCode::Rpd, format!("{:.3}", kohm).into_bytes())
            .await?;
        Ok(())
    }

    /// Set the current limit in mA. Returns the value the device settled
    /// on, also in mA.
    pub async fn set_limit_ma(&self, ma: f64) -> Result<f64> {
        self.write_current(OpCode::Limit, ma).await
    }

    /// Set the setpoint in mA. Returns the value the device settled on,
    /// also in mA.
    pub async fn set_setpoint_ma(&self, ma: f64) -> Result<f64> {
        self.write_current(OpCode::Setpoint, ma).await
    }

    async fn write_current(&self, op_code: OpCode, ma: f64) -> Result<f64> {
        if !ma.is_finite() || ma < 0.0 {
            return Err(Error::InvalidParameter(format!("{} {} mA", op_code, ma)));
        }
        let amps = ma / MA_PER_A;
        let response = self
            .chan
            .write(op_code, format!("{:.5}", amps).into_bytes())
            .await?;
        // Some firmware revisions echo the settled value, some answer
        // with an empty field. Read back in the latter case; the write
        // just invalidated the cache, so this is a real wire read.
        match response.data_f64() {
            Ok(echo) => Ok(echo * MA_PER_A),
            Err(_) => Ok(self.chan.read(op_code).await?.data_f64()? * MA_PER_A),
        }
    }

    /// Drive the limit and/or the setpoint to zero, limit first.
    ///
    /// With both flags set this darkens the output completely. Zeroing
    /// only the setpoint leaves a previously programmed limit in place
    /// for the next session.
    pub async fn zero(&self, zero_limit: bool, zero_setpoint: bool) -> Result<()> {
        if zero_limit {
            self.set_limit_ma(0.0).await?;
        }
        if zero_setpoint {
            self.set_setpoint_ma(0.0).await?;
        }
        Ok(())
    }

    /// Bring-up half for a laser channel: start from a dark output.
    pub async fn initialize(&self) -> Result<()> {
        self.zero(true, true).await
    }

    /// Refresh everything this channel tracks.
    pub async fn update(&self) -> Result<LaserSnapshot> {
        Ok(LaserSnapshot {
            mode: self.mode().await?,
            current_monitor_ma: self.current_monitor_ma().await?,
            power_monitor_ma: self.power_monitor_ma().await?,
            limit_ma: self.limit_ma().await?,
            setpoint_ma: self.setpoint_ma().await?,
        })
    }

    /// Shutdown half for a laser channel: zero the limit, then the
    /// setpoint. Each write is attempted even if the previous one
    /// failed; failures are logged, never raised.
    pub async fn close(&self) {
        if let Err(e) = self.set_limit_ma(0.0).await {
            warn!(channel = %self.id(), error = %e, "Failed to zero limit during shutdown");
        }
        if let Err(e) = self.set_setpoint_ma(0.0).await {
            warn!(channel = %self.id(), error = %e, "Failed to zero setpoint during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandPacket, ResponsePacket};
    use fl593_core::cache::ExpiringCache;
    use fl593_core::transport::Transport;
    use fl593_core::types::{EndCode, OpType, DEV_TYPE, PROTOCOL_TIMEOUT};
    use fl593_test_harness::MockTransport;
    use std::sync::Arc;

    fn laser_over(mock: MockTransport) -> LaserChannel {
        LaserChannel::new(RegisterChannel::new(
            ChannelId::Ld1,
            Arc::new(tokio::sync::Mutex::new(Box::new(mock) as Box<dyn Transport>)),
            Arc::new(ExpiringCache::new()),
            PROTOCOL_TIMEOUT,
        ))
    }

    fn ok_response(op_type: OpType, op_code: OpCode, data: &[u8]) -> Vec<u8> {
        ResponsePacket {
            dev_type: DEV_TYPE,
            channel: ChannelId::Ld1,
            op_type,
            op_code,
            end_code: EndCode::Ok,
            data: data.to_vec(),
        }
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn monitor_readings_scale_to_milliamps() {
        let mut mock = MockTransport::new();
        mock.expect(
            CommandPacket::read(ChannelId::Ld1, OpCode::IMon).encode().unwrap(),
            ok_response(OpType::Read, OpCode::IMon, b"0.1234"),
        );

        let laser = laser_over(mock);
        let ma = laser.current_monitor_ma().await.unwrap();
        assert!((ma - 123.4).abs() < 1e-9, "IMON = {} mA", ma);
    }

    #[tokio::test]
    async fn setpoint_write_scales_from_milliamps() {
        let mut mock = MockTransport::new();
        mock.expect(
            CommandPacket::write(ChannelId::Ld1, OpCode::Setpoint, &b"0.05000"[..])
                .encode()
                .unwrap(),
            ok_response(OpType::Write, OpCode::Setpoint, b"0.05000"),
        );

        let laser = laser_over(mock);
        let echoed = laser.set_setpoint_ma(50.0).await.unwrap();
        assert!((echoed - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_write_echo_falls_back_to_read_back() {
        let mut mock = MockTransport::new();
        mock.expect(
            CommandPacket::write(ChannelId::Ld1, OpCode::Limit, &b"0.10000"[..])
                .encode()
                .unwrap(),
            ok_response(OpType::Write, OpCode::Limit, b""),
        );
        mock.expect(
            CommandPacket::read(ChannelId::Ld1, OpCode::Limit).encode().unwrap(),
            ok_response(OpType::Read, OpCode::Limit, b"0.10000"),
        );

        let laser = laser_over(mock);
        let settled = laser.set_limit_ma(100.0).await.unwrap();
        assert!((settled - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn negative_current_is_rejected_host_side() {
        let mock = MockTransport::new();
        let laser = laser_over(mock);
        assert!(matches!(
            laser.set_setpoint_ma(-1.0).await,
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            laser.set_limit_ma(f64::NAN).await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn mode_flag_maps_to_feedback_mode() {
        let mut mock = MockTransport::new();
        mock.expect(
            CommandPacket::read(ChannelId::Ld1, OpCode::Mode).encode().unwrap(),
            ok_response(OpType::Read, OpCode::Mode, b"0"),
        );

        let laser = laser_over(mock);
        assert_eq!(laser.mode().await.unwrap(), FeedbackMode::ConstantCurrent);
    }

    #[tokio::test]
    async fn set_mode_is_refused() {
        let mock = MockTransport::new();
        let log = mock.sent_log();
        let laser = laser_over(mock);
        assert!(matches!(
            laser.set_mode(FeedbackMode::ConstantPower).await,
            Err(Error::Unsupported(_))
        ));
        // Nothing may have reached the wire.
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_honors_selection_flags() {
        // Setpoint only: the limit register is never touched.
        let mut mock = MockTransport::new();
        let log = mock.sent_log();
        mock.expect(
            CommandPacket::write(ChannelId::Ld1, OpCode::Setpoint, &b"0.00000"[..])
                .encode()
                .unwrap(),
            ok_response(OpType::Write, OpCode::Setpoint, b"0.00000"),
        );

        let laser = laser_over(mock);
        laser.zero(false, true).await.unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);

        // Both: limit first, then setpoint.
        let mut mock = MockTransport::new();
        let log = mock.sent_log();
        mock.expect(
            CommandPacket::write(ChannelId::Ld1, OpCode::Limit, &b"0.00000"[..])
                .encode()
                .unwrap(),
            ok_response(OpType::Write, OpCode::Limit, b"0.00000"),
        );
        mock.expect(
            CommandPacket::write(ChannelId::Ld1, OpCode::Setpoint, &b"0.00000"[..])
                .encode()
                .unwrap(),
            ok_response(OpType::Write, OpCode::Setpoint, b"0.00000"),
        );

        let laser = laser_over(mock);
        laser.zero(true, true).await.unwrap();
        let sent = log.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0][3], OpCode::Limit.wire());
        assert_eq!(sent[1][3], OpCode::Setpoint.wire());
    }

    #[tokio::test]
    async fn close_zeroes_limit_then_setpoint_despite_failures() {
        let mut mock = MockTransport::new();
        // Both writes fail (no expectations), but both must be attempted,
        // limit first.
        let log = mock.sent_log();
        mock.fail_next_sends(2);

        let laser = laser_over(mock);
        laser.close().await;

        let sent = log.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let limit_cmd = CommandPacket::write(ChannelId::Ld1, OpCode::Limit, &b"0.00000"[..])
            .encode()
            .unwrap();
        let setpoint_cmd = CommandPacket::write(ChannelId::Ld1, OpCode::Setpoint, &b"0.00000"[..])
            .encode()
            .unwrap();
        assert_eq!(sent[0], limit_cmd);
        assert_eq!(sent[1], setpoint_cmd);
    }
}
