//! Device-level state machine.
//!
//! [`Fl593`] owns the shared transport, the three channel wrappers, and
//! the lifecycle: bring-up with paced retries, periodic refresh, and the
//! safety shutdown that leaves the hardware dark before the transport is
//! released.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use fl593_core::cache::ExpiringCache;
use fl593_core::error::Result;
use fl593_core::transport::Transport;
use fl593_core::types::{ChannelId, MAX_INIT_RETRIES, PROTOCOL_TIMEOUT};

use crate::channel::{RegisterChannel, SharedTransport};
use crate::laser::{LaserChannel, LaserSnapshot};
use crate::status::StatusChannel;

/// Lifecycle state of a device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No device session; the transport has been released or never
    /// attached.
    Unattached,
    /// Bring-up handshake in progress.
    Probing,
    /// Handshake complete; the device is usable.
    Ready,
    /// Bring-up gave up; the handle is dead.
    Failed,
}

/// Device behavior knobs.
///
/// The defaults are the safe ones: outputs start and end dark, the
/// remote enable is parked off on exit.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Per-exchange protocol timeout.
    pub timeout: Duration,
    /// Bring-up handshake attempts before giving up.
    pub max_init_retries: u32,
    /// Pause before each handshake attempt.
    pub retry_delay: Duration,
    /// Remote enable state written during bring-up.
    pub startup_remote_enable: bool,
    /// Remote enable state parked during shutdown.
    pub exit_remote_enable: bool,
    /// Zero both lasers' limit and setpoint during bring-up.
    pub zero_on_start: bool,
    /// Zero both lasers' limit and setpoint during shutdown.
    pub zero_on_close: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            timeout: PROTOCOL_TIMEOUT,
            max_init_retries: MAX_INIT_RETRIES,
            retry_delay: Duration::from_millis(100),
            startup_remote_enable: false,
            exit_remote_enable: false,
            zero_on_start: true,
            zero_on_close: true,
        }
    }
}

/// One refreshed view of the whole board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSnapshot {
    pub ld1: LaserSnapshot,
    pub ld2: LaserSnapshot,
}

/// A connected FL593FL evaluation board.
///
/// Built by [`Fl593Builder`](crate::builder::Fl593Builder), which runs
/// the full bring-up. All channels share one transport and one read
/// cache.
pub struct Fl593 {
    transport: SharedTransport,
    status: StatusChannel,
    ld1: LaserChannel,
    ld2: LaserChannel,
    config: DeviceConfig,
    state: Mutex<DeviceState>,
}

impl Fl593 {
    /// Wire up channel wrappers over a transport. The handle starts
    /// [`Unattached`](DeviceState::Unattached); call
    /// [`initialize`](Fl593::initialize) to run bring-up.
    pub fn new(transport: Box<dyn Transport>, config: DeviceConfig) -> Self {
        let transport: SharedTransport = Arc::new(tokio::sync::Mutex::new(transport));
        let cache = Arc::new(ExpiringCache::new());

        let chan = |id: ChannelId| {
            RegisterChannel::new(id, Arc::clone(&transport), Arc::clone(&cache), config.timeout)
        };

        Fl593 {
            status: StatusChannel::new(chan(ChannelId::Status)),
            ld1: LaserChannel::new(chan(ChannelId::Ld1)),
            ld2: LaserChannel::new(chan(ChannelId::Ld2)),
            transport,
            config,
            state: Mutex::new(DeviceState::Unattached),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        *self.state.lock().unwrap()
    }

    /// The status/control channel.
    pub fn status(&self) -> &StatusChannel {
        &self.status
    }

    /// Laser driver channel 1.
    pub fn ld1(&self) -> &LaserChannel {
        &self.ld1
    }

    /// Laser driver channel 2.
    pub fn ld2(&self) -> &LaserChannel {
        &self.ld2
    }

    /// Both laser channels, for iteration.
    pub fn lasers(&self) -> [&LaserChannel; 2] {
        [&self.ld1, &self.ld2]
    }

    /// Run bring-up: handshake with paced retries, then start from dark
    /// outputs.
    ///
    /// On failure the handle moves to [`DeviceState::Failed`] and the
    /// error propagates.
    pub async fn initialize(&self) -> Result<()> {
        *self.state.lock().unwrap() = DeviceState::Probing;
        debug!("Device bring-up starting");

        let result = self.bring_up().await;
        match &result {
            Ok(()) => {
                *self.state.lock().unwrap() = DeviceState::Ready;
                info!("Device ready");
            }
            Err(e) => {
                *self.state.lock().unwrap() = DeviceState::Failed;
                warn!(error = %e, "Device bring-up failed");
            }
        }
        result
    }

    async fn bring_up(&self) -> Result<()> {
        self.status
            .initialize(
                self.config.startup_remote_enable,
                self.config.max_init_retries,
                self.config.retry_delay,
            )
            .await?;

        if self.config.zero_on_start {
            self.ld1.initialize().await?;
            self.ld2.initialize().await?;
        }

        self.status.update_alarms().await?;
        Ok(())
    }

    /// Refresh the alarm vector and both laser channels.
    pub async fn update(&self) -> Result<DeviceSnapshot> {
        self.status.update().await?;
        Ok(DeviceSnapshot {
            ld1: self.ld1.update().await?,
            ld2: self.ld2.update().await?,
        })
    }

    /// Shut down: leave the hardware dark, then release the transport.
    ///
    /// Every safety action is attempted regardless of earlier failures;
    /// the lasers are zeroed before the remote enable is parked and the
    /// transport closed. Always leaves the handle
    /// [`Unattached`](DeviceState::Unattached).
    pub async fn close(&self) {
        debug!("Device shutdown starting");

        if self.config.zero_on_close {
            self.ld1.close().await;
            self.ld2.close().await;
        }
        self.status.close(self.config.exit_remote_enable).await;

        if let Err(e) = self.transport.lock().await.close().await {
            warn!(error = %e, "Failed to close transport (continuing anyway)");
        }

        *self.state.lock().unwrap() = DeviceState::Unattached;
        info!("Device shut down");
    }
}
