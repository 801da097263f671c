//! fl593-core: Core traits, types, and error definitions for the FL593FL
//! control layer.
//!
//! This crate defines the transport-agnostic abstractions the rest of the
//! workspace builds on. Applications that only consume typed device
//! handles depend on these types without pulling in any transport
//! backend.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`ChannelId`] / [`OpType`] / [`OpCode`] / [`EndCode`] -- the protocol
//!   vocabulary
//! - [`ExpiringCache`] -- TTL-keyed read cache
//! - [`Error`] / [`Result`] -- error handling

pub mod cache;
pub mod error;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use fl593_core::*`.
pub use cache::{CacheKey, Clock, ExpiringCache, ManualClock, SystemClock, Ttl, ttl_policy};
pub use error::{Error, Result};
pub use transport::Transport;
pub use types::*;
