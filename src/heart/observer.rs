//! Beat observers.
//!
//! An observer is the heart's outbound display/telemetry sink. It is strictly
//! best-effort: errors and panics raised by an observer are logged by the
//! heart and never interrupt ticking.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;

/// Sent once when the heart starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObserverSettings {
    /// Configured epoch length
    pub epoch_interval_secs: u64,
    /// Configured cycle length
    pub cycle_interval_secs: u64,
    /// Wall-clock time of this start
    pub started_at: DateTime<Utc>,
}

/// Sent on every beat.
///
/// `pct_epoch` and `pct_cycle` are the elapsed fractions of the running
/// epoch and cycle. They exceed `1.0` while a rollover is due but deferred.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Beat {
    /// Current epoch counter
    pub epoch: u64,
    /// Current cycle counter
    pub cycle: u64,
    /// Wall-clock time of the most recent start
    pub started_at: DateTime<Utc>,
    /// Fraction of the epoch interval elapsed since the last epoch rollover
    pub pct_epoch: f64,
    /// Fraction of the cycle interval elapsed since the last cycle rollover
    pub pct_cycle: f64,
}

/// Receives the heart's beats.
///
/// Called synchronously from the tick loop, so implementations must return
/// promptly.
pub trait BeatObserver: Send + Sync {
    /// Called once per start.
    fn settings(&self, _settings: &ObserverSettings) -> Result<()> {
        Ok(())
    }

    /// Called on every beat.
    fn beat(&self, beat: &Beat) -> Result<()>;
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BeatObserver for NoopObserver {
    fn beat(&self, _beat: &Beat) -> Result<()> {
        Ok(())
    }
}

/// Observer that reports beats through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl BeatObserver for LogObserver {
    fn settings(&self, settings: &ObserverSettings) -> Result<()> {
        info!(
            epoch_interval_secs = settings.epoch_interval_secs,
            cycle_interval_secs = settings.cycle_interval_secs,
            started_at = %settings.started_at,
            "Heart settings"
        );
        Ok(())
    }

    fn beat(&self, beat: &Beat) -> Result<()> {
        debug!(
            epoch = beat.epoch,
            cycle = beat.cycle,
            pct_epoch = beat.pct_epoch,
            pct_cycle = beat.pct_cycle,
            uptime_secs = (Utc::now() - beat.started_at).num_seconds(),
            "Beat"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_beat() -> Beat {
        Beat {
            epoch: 3,
            cycle: 12,
            started_at: Utc::now(),
            pct_epoch: 0.25,
            pct_cycle: 1.5,
        }
    }

    #[test]
    fn test_builtin_observers_accept_beats() {
        let beat = sample_beat();
        assert!(NoopObserver.beat(&beat).is_ok());
        assert!(LogObserver.beat(&beat).is_ok());

        let settings = ObserverSettings {
            epoch_interval_secs: 900,
            cycle_interval_secs: 300,
            started_at: beat.started_at,
        };
        assert!(NoopObserver.settings(&settings).is_ok());
        assert!(LogObserver.settings(&settings).is_ok());
    }

    #[test]
    fn test_beat_serializes() {
        let beat = sample_beat();
        let json = serde_json::to_value(&beat).unwrap();
        assert_eq!(json["epoch"], 3);
        assert_eq!(json["cycle"], 12);
        assert_eq!(json["pct_cycle"], 1.5);
        assert!(json["started_at"].is_string());
    }
}
