//! fl593-test-harness: Test utilities and simulated devices for the
//! FL593FL control layer.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing
//! with pre-loaded packet exchanges, and [`SimTransport`], a synthetic
//! board with real register state for integration tests and examples.

pub mod mock_transport;
pub mod sim;

pub use mock_transport::{MockTransport, SentLog};
pub use sim::SimTransport;
