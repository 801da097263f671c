//! Mock transport for deterministic testing of the protocol layers.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! command/response pairs. This lets you test packet encoding, cache
//! behavior, and the device state machine without real hardware.
//!
//! # Example
//!
//! ```
//! use fl593_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // Pre-load: when this command packet is sent, return this response.
//! let mut command = vec![0x00, 0x00, 0x01, 0x00]; // READ STATUS MODEL
//! command.resize(20, 0);
//! let mut response = vec![0x00, 0x00, 0x01, 0x00, 0x00];
//! response.extend_from_slice(b"FL593FL");
//! response.resize(21, 0);
//! mock.expect(command, response);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fl593_core::error::{Error, Result};
use fl593_core::transport::Transport;

/// A pre-loaded command/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// Response chunks, each returned by one `receive()` call.
    chunks: VecDeque<Vec<u8>>,
}

/// Shared view of everything sent through a [`MockTransport`].
///
/// Obtained from [`MockTransport::sent_log`] before the transport is
/// moved into the code under test, so assertions can inspect traffic
/// afterwards.
pub type SentLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// A mock [`Transport`] for testing without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation. The
/// corresponding response chunks are then returned by subsequent
/// `receive()` calls.
///
/// If the sent data does not match or the queue is exhausted, `send()`
/// returns an error (after recording the data, so safety-shutdown
/// traffic stays observable).
#[derive(Debug)]
pub struct MockTransport {
    /// Ordered queue of expected command/response pairs.
    expectations: VecDeque<Expectation>,
    /// Response chunks pending for upcoming `receive()` calls.
    pending: VecDeque<Vec<u8>>,
    /// Whether the transport is "connected".
    connected: bool,
    /// Number of upcoming `send()` calls that fail with a transport error.
    fail_sends: u32,
    /// Log of all bytes sent through this transport.
    sent_log: SentLog,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending: VecDeque::new(),
            connected: true,
            fail_sends: 0,
            sent_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add an expected command/response pair.
    ///
    /// When `send()` is called with data matching `request`, the
    /// subsequent `receive()` call will return `response` in one piece.
    /// An empty `response` makes the device "silent" for that exchange.
    pub fn expect(&mut self, request: impl Into<Vec<u8>>, response: impl Into<Vec<u8>>) {
        let response = response.into();
        let chunks = if response.is_empty() {
            VecDeque::new()
        } else {
            VecDeque::from(vec![response])
        };
        self.expectations.push_back(Expectation {
            request: request.into(),
            chunks,
        });
    }

    /// Add an expectation whose response arrives split across several
    /// `receive()` calls.
    pub fn expect_chunked(&mut self, request: impl Into<Vec<u8>>, chunks: Vec<Vec<u8>>) {
        self.expectations.push_back(Expectation {
            request: request.into(),
            chunks: VecDeque::from(chunks),
        });
    }

    /// Make the next `n` `send()` calls fail with a transport error.
    ///
    /// The sent data is still recorded, so tests can verify what the
    /// code under test attempted during failure handling.
    pub fn fail_next_sends(&mut self, n: u32) {
        self.fail_sends = n;
    }

    /// A shared handle to the sent-data log.
    ///
    /// Clone this before moving the transport into the code under test.
    pub fn sent_log(&self) -> SentLog {
        Arc::clone(&self.sent_log)
    }

    /// Snapshot of all data sent so far.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.sent_log.lock().unwrap().clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls
    /// will return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        // Record first, even for failing sends.
        self.sent_log.lock().unwrap().push(data.to_vec());

        if self.fail_sends > 0 {
            self.fail_sends -= 1;
            return Err(Error::Transport("injected send failure".into()));
        }

        if let Some(expectation) = self.expectations.pop_front() {
            if data != expectation.request.as_slice() {
                return Err(Error::Transport(format!(
                    "unexpected send data: expected {:02X?}, got {:02X?}",
                    expectation.request, data
                )));
            }
            self.pending = expectation.chunks;
            Ok(())
        } else {
            Err(Error::Transport(
                "no more expectations in mock transport".into(),
            ))
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        match self.pending.pop_front() {
            None => Err(Error::Timeout),
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    // Caller's buffer was small; keep the rest for the
                    // next call.
                    self.pending.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
