//! Register-level channel abstraction.
//!
//! A [`RegisterChannel`] binds a [`ChannelId`] to a shared transport and
//! the expiring read cache. The typed [`StatusChannel`](crate::status) and
//! [`LaserChannel`](crate::laser) wrappers are built on top of it.
//!
//! The board is strictly half duplex: one command packet out, one
//! response packet back. The transport mutex is held across the full
//! exchange so concurrent callers cannot interleave packets.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, trace};

use fl593_core::cache::{ttl_policy, CacheKey, ExpiringCache, Ttl};
use fl593_core::error::{Error, Result};
use fl593_core::transport::Transport;
use fl593_core::types::{ChannelId, OpCode, OpType, RSP_PACKET_LEN};

use crate::protocol::{CommandPacket, ResponsePacket};

/// Shared transport handle. The mutex serializes exchanges on the
/// half-duplex pipe.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// One addressable channel of the board, with cached reads.
pub struct RegisterChannel {
    id: ChannelId,
    transport: SharedTransport,
    cache: Arc<ExpiringCache<ResponsePacket>>,
    timeout: Duration,
}

impl RegisterChannel {
    pub fn new(
        id: ChannelId,
        transport: SharedTransport,
        cache: Arc<ExpiringCache<ResponsePacket>>,
        timeout: Duration,
    ) -> Self {
        RegisterChannel {
            id,
            transport,
            cache,
            timeout,
        }
    }

    /// This channel's protocol identity.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// READ a register, consulting the cache first.
    pub async fn read(&self, op_code: OpCode) -> Result<ResponsePacket> {
        self.cached_query(OpType::Read, op_code).await
    }

    /// Query a register's minimum allowed value.
    pub async fn min(&self, op_code: OpCode) -> Result<ResponsePacket> {
        self.cached_query(OpType::Min, op_code).await
    }

    /// Query a register's maximum allowed value.
    pub async fn max(&self, op_code: OpCode) -> Result<ResponsePacket> {
        self.cached_query(OpType::Max, op_code).await
    }

    /// WRITE a register.
    ///
    /// Writes always hit the wire, and a successful write invalidates
    /// the cached READ of the same register so the next read observes
    /// the new value.
    pub async fn write(&self, op_code: OpCode, data: impl Into<Vec<u8>>) -> Result<ResponsePacket> {
        let packet = CommandPacket::write(self.id, op_code, data);
        let response = self.dispatch(&packet).await?;
        self.cache.invalidate(&CacheKey {
            channel: self.id,
            op_type: OpType::Read,
            op_code,
        });
        Ok(response)
    }

    async fn cached_query(&self, op_type: OpType, op_code: OpCode) -> Result<ResponsePacket> {
        let key = CacheKey {
            channel: self.id,
            op_type,
            op_code,
        };
        if let Some(cached) = self.cache.get(&key) {
            trace!(channel = %self.id, op = %op_code, "Cache hit");
            return Ok(cached);
        }

        let packet = CommandPacket {
            channel: self.id,
            op_type,
            op_code,
            data: Vec::new(),
        };
        let response = self.dispatch(&packet).await?;

        // Only successful responses are cached; dispatch already turned
        // device errors into Err.
        match ttl_policy(op_code) {
            Ttl::Immediate => {}
            ttl => self.cache.insert(key, response.clone(), ttl),
        }
        Ok(response)
    }

    /// Send one command packet and collect its response.
    ///
    /// Holds the transport lock for the full exchange. Bytes are
    /// accumulated until the fixed response length arrives or the
    /// timeout budget runs out; a response carrying a non-OK end code
    /// becomes [`Error::Device`].
    async fn dispatch(&self, packet: &CommandPacket) -> Result<ResponsePacket> {
        let bytes = packet.encode()?;
        let mut transport = self.transport.lock().await;

        trace!(
            channel = %self.id,
            op_type = %packet.op_type,
            op = %packet.op_code,
            "Dispatching command"
        );

        transport.send(&bytes).await?;

        let mut buf = [0u8; RSP_PACKET_LEN];
        let mut response_buf: Vec<u8> = Vec::with_capacity(RSP_PACKET_LEN);
        let deadline = tokio::time::Instant::now() + self.timeout;

        while response_buf.len() < RSP_PACKET_LEN {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                break;
            }
            match transport.receive(&mut buf, remaining).await {
                Ok(n) => response_buf.extend_from_slice(&buf[..n]),
                Err(Error::Timeout) => break,
                Err(e) => return Err(e),
            }
        }
        drop(transport);

        if response_buf.is_empty() {
            debug!(channel = %self.id, op = %packet.op_code, "No response within timeout");
            return Err(Error::Timeout);
        }

        let response = ResponsePacket::decode(&response_buf)?;
        if !response.end_code.is_ok() {
            debug!(
                channel = %self.id,
                op = %packet.op_code,
                end_code = %response.end_code,
                "Device reported error"
            );
            return Err(Error::Device(response.end_code));
        }
        Ok(response)
    }
}
