//! Typed wrapper for the status/control channel.
//!
//! [`StatusChannel`] exposes device identity, the alarm flag vector, and
//! the remote enable switch as typed operations on channel 0. It also
//! carries the bring-up handshake and the safety half of shutdown for
//! the control channel.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use fl593_core::error::{Error, Result};
use fl593_core::types::{Alarm, ChannelId, OpCode, FLAG_OFF, FLAG_ON, NUM_ALARMS};

use crate::channel::RegisterChannel;

/// The board's status/control channel.
///
/// Alarm state is kept locally between refreshes: [`update_alarms`]
/// pulls the vector from the device, [`alarm`] answers from the last
/// successful pull. After a failed refresh the state reads as unknown
/// (`None`) rather than stale.
///
/// [`update_alarms`]: StatusChannel::update_alarms
/// [`alarm`]: StatusChannel::alarm
pub struct StatusChannel {
    chan: RegisterChannel,
    alarms: Mutex<Option<[bool; NUM_ALARMS]>>,
}

impl StatusChannel {
    pub fn new(chan: RegisterChannel) -> Self {
        debug_assert_eq!(chan.id(), ChannelId::Status);
        StatusChannel {
            chan,
            alarms: Mutex::new(None),
        }
    }

    /// Device model string, e.g. `"FL593FL"`.
    pub async fn model(&self) -> Result<String> {
        Ok(self.chan.read(OpCode::Model).await?.data_str())
    }

    /// Device serial number.
    pub async fn serial(&self) -> Result<String> {
        Ok(self.chan.read(OpCode::Serial).await?.data_str())
    }

    /// Firmware version string.
    pub async fn firmware_version(&self) -> Result<String> {
        Ok(self.chan.read(OpCode::FwVer).await?.data_str())
    }

    /// Device type code.
    pub async fn device_type(&self) -> Result<String> {
        Ok(self.chan.read(OpCode::DevType).await?.data_str())
    }

    /// Number of laser channels supported in the current mode.
    pub async fn channel_count(&self) -> Result<u8> {
        let response = self.chan.read(OpCode::ChanCt).await?;
        let s = response.data_str();
        s.trim().parse::<u8>().map_err(|_| {
            Error::InvalidData(format!("channel count is not numeric: {:?}", s))
        })
    }

    /// Refresh the alarm vector from the device.
    ///
    /// On failure the local alarm state becomes unknown before the error
    /// propagates, so callers never act on stale flags.
    pub async fn update_alarms(&self) -> Result<()> {
        let flags = self
            .chan
            .read(OpCode::Alarm)
            .await
            .and_then(|response| response.data_alarms());

        match flags {
            Ok(flags) => {
                *self.alarms.lock().unwrap() = Some(flags);
                Ok(())
            }
            Err(e) => {
                *self.alarms.lock().unwrap() = None;
                Err(e)
            }
        }
    }

    /// One flag from the last successful alarm refresh, or `None` if the
    /// state is unknown.
    pub fn alarm(&self, alarm: Alarm) -> Option<bool> {
        self.alarms.lock().unwrap().map(|flags| flags[alarm.index()])
    }

    /// Whether laser output is currently live (OUT flag).
    pub fn output_enabled(&self) -> Option<bool> {
        self.alarm(Alarm::Out)
    }

    /// State of the NT interlock pin (XEN flag).
    pub fn external_enabled(&self) -> Option<bool> {
        self.alarm(Alarm::Xen)
    }

    /// State of the front-panel enable switch (LEN flag).
    pub fn local_enabled(&self) -> Option<bool> {
        self.alarm(Alarm::Len)
    }

    /// State of the remote enable register (REN flag).
    pub fn remote_enabled(&self) -> Option<bool> {
        self.alarm(Alarm::Ren)
    }

    /// One-line rendering of the last alarm refresh, for logs and
    /// consoles. Set flags are listed by name; `"unknown"` if no refresh
    /// has succeeded yet.
    pub fn alarm_summary(&self) -> String {
        match *self.alarms.lock().unwrap() {
            None => "unknown".to_string(),
            Some(flags) => {
                let set: Vec<&str> = Alarm::ALL
                    .iter()
                    .filter(|a| flags[a.index()])
                    .map(|a| a.token())
                    .collect();
                if set.is_empty() {
                    "none".to_string()
                } else {
                    set.join(" ")
                }
            }
        }
    }

    /// Set the remote output enable register.
    ///
    /// Output only goes live when the local switch and the NT pin agree.
    pub async fn set_remote_enable(&self, on: bool) -> Result<()> {
        let flag = if on { FLAG_ON } else { FLAG_OFF };
        self.chan.write(OpCode::Enable, vec![flag]).await?;
        Ok(())
    }

    /// Set the identify flag (blinks the board LED).
    pub async fn set_identify(&self, on: bool) -> Result<()> {
        let flag = if on { FLAG_ON } else { FLAG_OFF };
        self.chan.write(OpCode::Identify, vec![flag]).await?;
        Ok(())
    }

    /// Save the current settings to non-volatile memory.
    pub async fn save(&self) -> Result<()> {
        self.chan.write(OpCode::Save, Vec::new()).await?;
        Ok(())
    }

    /// Recall settings from non-volatile memory.
    pub async fn recall(&self) -> Result<()> {
        self.chan.write(OpCode::Recall, Vec::new()).await?;
        Ok(())
    }

    /// Bring-up handshake: write the startup enable state until the
    /// device acknowledges.
    ///
    /// Makes exactly `max_attempts` paced attempts; each failure is
    /// logged and retried after `retry_delay`. Gives up with
    /// [`Error::InitializationFailed`].
    pub async fn initialize(
        &self,
        startup_enable: bool,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<()> {
        for attempt in 1..=max_attempts {
            tokio::time::sleep(retry_delay).await;
            match self.set_remote_enable(startup_enable).await {
                Ok(()) => {
                    debug!(attempt, "Device handshake complete");
                    return Ok(());
                }
                Err(e) => {
                    debug!(attempt, max_attempts, error = %e, "Device handshake attempt failed");
                }
            }
        }
        Err(Error::InitializationFailed {
            attempts: max_attempts,
        })
    }

    /// Refresh everything this channel tracks.
    pub async fn update(&self) -> Result<()> {
        self.update_alarms().await
    }

    /// Shutdown half for the control channel: park the remote enable in
    /// `exit_state`. Failures are logged, never raised, so the rest of
    /// shutdown always runs.
    pub async fn close(&self, exit_state: bool) {
        if let Err(e) = self.set_remote_enable(exit_state).await {
            warn!(error = %e, "Failed to park remote enable during shutdown");
        }
        *self.alarms.lock().unwrap() = None;
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

    fn status_over(mock: MockTransport) -> StatusChannel {
        StatusChannel::new(RegisterChannel::new(
            ChannelId::Status,
            Arc::new(tokio::sync::Mutex::new(Box::new(mock) as Box<dyn Transport>)),
            Arc::new(ExpiringCache::new()),
            PROTOCOL_TIMEOUT,
        ))
    }

    fn ok_response(op_type: OpType, op_code: OpCode, data: &[u8]) -> Vec<u8> {
        ResponsePacket {
            dev_type: DEV_TYPE,
            channel: ChannelId::Status,
            op_type,
            op_code,
            end_code: EndCode::Ok,
            data: data.to_vec(),
        }
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn identity_getters() {
        let mut mock = MockTransport::new();
        mock.expect(
            CommandPacket::read(ChannelId::Status, OpCode::Model).encode().unwrap(),
            ok_response(OpType::Read, OpCode::Model, b"FL593FL"),
        );
        mock.expect(
            CommandPacket::read(ChannelId::Status, OpCode::ChanCt).encode().unwrap(),
            ok_response(OpType::Read, OpCode::ChanCt, b"2"),
        );

        let status = status_over(mock);
        assert_eq!(status.model().await.unwrap(), "FL593FL");
        assert_eq!(status.channel_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn alarm_refresh_and_lookup() {
        let mut mock = MockTransport::new();
        mock.expect(
            CommandPacket::read(ChannelId::Status, OpCode::Alarm).encode().unwrap(),
            ok_response(OpType::Read, OpCode::Alarm, b"1110000000"),
        );

        let status = status_over(mock);
        assert_eq!(status.alarm(Alarm::Out), None);

        status.update_alarms().await.unwrap();
        assert_eq!(status.alarm(Alarm::Out), Some(true));
        assert_eq!(status.alarm(Alarm::Xen), Some(true));
        assert_eq!(status.alarm(Alarm::Ren), Some(false));
        assert_eq!(status.output_enabled(), Some(true));
        assert_eq!(status.alarm_summary(), "OUT XEN LEN");
    }

    #[tokio::test]
    async fn failed_refresh_makes_alarms_unknown() {
        let mut mock = MockTransport::new();
        let alarm_cmd = CommandPacket::read(ChannelId::Status, OpCode::Alarm).encode().unwrap();
        mock.expect(
            alarm_cmd.clone(),
            ok_response(OpType::Read, OpCode::Alarm, b"0110000000"),
        );
        // Second refresh: silent device.
        mock.expect(alarm_cmd, Vec::new());

        let status = status_over(mock);
        status.update_alarms().await.unwrap();
        assert_eq!(status.alarm(Alarm::Xen), Some(true));

        assert!(status.update_alarms().await.is_err());
        assert_eq!(status.alarm(Alarm::Xen), None);
    }

    #[tokio::test]
    async fn set_remote_enable_writes_flag_byte() {
        let mut mock = MockTransport::new();
        mock.expect(
            CommandPacket::write(ChannelId::Status, OpCode::Enable, vec![FLAG_ON])
                .encode()
                .unwrap(),
            ok_response(OpType::Write, OpCode::Enable, b"1"),
        );

        let status = status_over(mock);
        status.set_remote_enable(true).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_makes_exactly_the_budgeted_attempts() {
        let mock = MockTransport::new();
        // No expectations: every handshake write fails.
        let log = mock.sent_log();

        let status = status_over(mock);
        let result = status
            .initialize(false, 10, Duration::from_millis(100))
            .await;

        match result.unwrap_err() {
            Error::InitializationFailed { attempts } => assert_eq!(attempts, 10),
            other => panic!("expected InitializationFailed, got: {:?}", other),
        }
        assert_eq!(log.lock().unwrap().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_stops_on_first_success() {
        let mut mock = MockTransport::new();
        mock.fail_next_sends(3);
        mock.expect(
            CommandPacket::write(ChannelId::Status, OpCode::Enable, vec![FLAG_OFF])
                .encode()
                .unwrap(),
            ok_response(OpType::Write, OpCode::Enable, b"0"),
        );
        let log = mock.sent_log();

        let status = status_over(mock);
        status
            .initialize(false, 10, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn close_swallows_failures() {
        let mock = MockTransport::new();
        let log = mock.sent_log();

        let status = status_over(mock);
        // No expectations, so the enable write fails; close must not panic
        // or propagate.
        status.close(false).await;
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(status.alarm(Alarm::Out), None);
    }
}
