//! Expiring read cache for register values.
//!
//! Polling UIs hammer the same handful of registers many times a second,
//! but the board services every exchange over a 100 ms-timeout bulk pipe.
//! The cache absorbs that traffic: each register class carries a TTL
//! policy, and reads within the TTL are answered from the cache instead
//! of the wire.
//!
//! Time is injected through the [`Clock`] trait so expiry behavior can be
//! tested without sleeping.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::{ChannelId, OpCode, OpType};

/// Source of the current instant.
///
/// Production code uses [`SystemClock`]; tests use [`ManualClock`] and
/// advance time explicitly.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock backed [`Clock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced [`Clock`] for deterministic expiry tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward by `d`.
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += d;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// Cache lifetime class of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Identity registers never change; cache forever.
    Never,
    /// Live registers must always hit the wire; never cache.
    Immediate,
    /// Slowly changing registers; cache for the given duration.
    After(Duration),
}

/// TTL policy for a register, or `None` when the register class has no
/// cache entry and reads always dispatch.
///
/// Identity registers are immutable, monitors and alarms are live,
/// setpoints and limits can change underneath the host (tracking mode,
/// front-panel switches) so they get a short lifetime, and configuration
/// registers change rarely.
pub fn ttl_policy(op_code: OpCode) -> Ttl {
    match op_code {
        OpCode::Model
        | OpCode::Serial
        | OpCode::FwVer
        | OpCode::DevType
        | OpCode::ChanCt => Ttl::Never,
        OpCode::Alarm
        | OpCode::IMon
        | OpCode::PMon
        | OpCode::Identify
        | OpCode::Save
        | OpCode::Recall
        | OpCode::Passwd
        | OpCode::Revert => Ttl::Immediate,
        OpCode::Setpoint | OpCode::Limit | OpCode::Enable => Ttl::After(Duration::from_millis(100)),
        OpCode::Mode | OpCode::Track | OpCode::Rpd | OpCode::CalIScale => {
            Ttl::After(Duration::from_secs(1))
        }
    }
}

/// Identity of a cached register read.
///
/// The key is the full (channel, op-type, op-code) triple: a MIN read and
/// a READ of the same register are distinct entries, as are the same
/// register on different channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub channel: ChannelId,
    pub op_type: OpType,
    pub op_code: OpCode,
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
    ttl: Ttl,
}

/// TTL-keyed cache for successful register reads.
///
/// Only successful responses are stored; errors always propagate and
/// leave the cache untouched. Writes to a register invalidate the cached
/// read of the same register (the caller does this through
/// [`invalidate`](ExpiringCache::invalidate)).
pub struct ExpiringCache<V, C: Clock = SystemClock> {
    entries: Mutex<HashMap<CacheKey, Entry<V>>>,
    clock: C,
}

impl<V: Clone> ExpiringCache<V, SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<V: Clone> Default for ExpiringCache<V, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone, C: Clock> ExpiringCache<V, C> {
    pub fn with_clock(clock: C) -> Self {
        ExpiringCache {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Look up a fresh entry. Expired entries are removed on the way out.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        let fresh = match entries.get(key) {
            None => return None,
            Some(entry) => match entry.ttl {
                Ttl::Never => true,
                Ttl::Immediate => false,
                Ttl::After(d) => self.clock.now().duration_since(entry.stored_at) < d,
            },
        };
        if fresh {
            entries.get(key).map(|e| e.value.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    /// Store a value under the given TTL class.
    ///
    /// `Ttl::Immediate` values are not stored at all; the next read must
    /// hit the wire.
    pub fn insert(&self, key: CacheKey, value: V, ttl: Ttl) {
        if ttl == Ttl::Immediate {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            Entry {
                value,
                stored_at: self.clock.now(),
                ttl,
            },
        );
    }

    /// Drop the entry for `key`, if any.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of live entries (including not-yet-collected expired ones).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
