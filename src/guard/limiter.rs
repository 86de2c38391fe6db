//! Per-source admission throttle.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::admission::Admission;
use super::key::ThrottleKey;
use crate::config::PulseConfig;
use crate::error::Result;

/// Throttles inbound connections per source.
///
/// A source is admitted when at least `beat * throttle_interval` has passed
/// since its *previous call*, whether that call was admitted or not. A source
/// retrying faster than the gate is therefore denied for as long as it keeps
/// retrying.
///
/// Keys are never evicted: the map grows with the number of distinct sources
/// seen over the process lifetime.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct Guard {
    /// Last call per throttle key
    requests: DashMap<ThrottleKey, Instant>,
    /// Minimum gap between admissions
    gate: Duration,
    /// Key sources by port instead of address
    key_by_port: bool,
}

impl Guard {
    /// Create a guard from the beat interval and the `guard` section.
    ///
    /// The `heart` section is not read and not validated here.
    pub fn new(config: &PulseConfig) -> Result<Self> {
        config.validate_guard()?;
        Ok(Self {
            requests: DashMap::new(),
            gate: config.throttle_gate(),
            key_by_port: config.guard.key_by_port,
        })
    }

    /// Check a caller against the current time.
    pub fn is_allowed(&self, address: IpAddr, port: u16) -> bool {
        self.check_at(address, port, Instant::now())
    }

    /// Check a caller as if the call happened at `now`.
    pub fn check_at(&self, address: IpAddr, port: u16, now: Instant) -> bool {
        let key = ThrottleKey::new(address, port, self.key_by_port);

        // The entry holds the shard lock, so the read and the overwrite are atomic per key.
        match self.requests.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(now);
                trace!(key = %key, "First call from source");
                true
            }
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                entry.insert(now);

                let allowed = elapsed >= self.gate;
                if !allowed {
                    debug!(
                        key = %key,
                        elapsed_ms = elapsed.as_millis() as u64,
                        gate_ms = self.gate.as_millis() as u64,
                        "Throttling source"
                    );
                }
                allowed
            }
        }
    }

    /// The minimum gap between two admissions of one key.
    pub fn gate(&self) -> Duration {
        self.gate
    }

    /// Whether keys are derived from ports.
    pub fn key_by_port(&self) -> bool {
        self.key_by_port
    }

    /// Number of distinct keys seen so far.
    pub fn tracked_keys(&self) -> usize {
        self.requests.len()
    }
}

impl Admission for Guard {
    fn is_allowed(&self, address: IpAddr, port: u16) -> bool {
        Guard::is_allowed(self, address, port)
    }
}
