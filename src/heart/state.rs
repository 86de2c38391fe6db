//! Heart counters and their read-only snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use super::personality::Personality;

/// Mutable heart state, guarded by the heart's mutex.
///
/// Instants drive all elapsed-time arithmetic. Wall-clock timestamps are only
/// derived for reporting, relative to the wall time captured at start.
#[derive(Debug, Default)]
pub(crate) struct HeartState {
    pub current_cycle: u64,
    pub current_epoch: u64,
    pub last_cycle_at: Option<Instant>,
    pub last_epoch_at: Option<Instant>,
    pub started_at: Option<Instant>,
    pub personality: Option<Personality>,
    pub running: bool,
    /// Wall time matching `started_at`
    anchor: Option<DateTime<Utc>>,
}

impl HeartState {
    /// Enter the running state, rolling over the first epoch.
    pub fn begin(&mut self, now: Instant, wall: DateTime<Utc>) {
        self.started_at = Some(now);
        self.anchor = Some(wall);
        self.running = true;
        self.start_new_epoch(now);
        self.last_cycle_at = Some(now);
    }

    /// Replace the personality and advance the epoch.
    pub fn start_new_epoch(&mut self, now: Instant) -> &Personality {
        self.last_epoch_at = Some(now);
        self.current_epoch += 1;
        self.personality.insert(Personality::generate())
    }

    /// Advance the cycle.
    pub fn roll_cycle(&mut self, now: Instant) {
        self.last_cycle_at = Some(now);
        self.current_cycle += 1;
    }

    /// Time since the last epoch and cycle rollovers.
    pub fn elapsed(&self, now: Instant) -> (Duration, Duration) {
        let since = |at: Option<Instant>| at.map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
        (since(self.last_epoch_at), since(self.last_cycle_at))
    }

    /// Map an instant onto the wall clock.
    pub fn wall(&self, instant: Instant) -> Option<DateTime<Utc>> {
        let anchor = self.anchor?;
        let started = self.started_at?;
        let offset = chrono::Duration::from_std(instant.saturating_duration_since(started))
            .unwrap_or_else(|_| chrono::Duration::zero());
        Some(anchor + offset)
    }

    pub fn started_wall(&self) -> Option<DateTime<Utc>> {
        self.anchor
    }

    pub fn snapshot(&self) -> HeartSnapshot {
        HeartSnapshot {
            last_cycle_at: self.last_cycle_at.and_then(|at| self.wall(at)),
            last_epoch_at: self.last_epoch_at.and_then(|at| self.wall(at)),
            personality: self.personality.clone(),
            current_cycle: self.current_cycle,
            current_epoch: self.current_epoch,
            started_at: self.anchor,
            running: self.running,
        }
    }
}

/// Point-in-time copy of the heart's reportable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartSnapshot {
    /// Time of the last cycle rollover, or of the start that reset the cycle clock
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Time of the last epoch rollover, `None` before the first start
    pub last_epoch_at: Option<DateTime<Utc>>,
    /// Identity for the current epoch, `None` before the first start
    pub personality: Option<Personality>,
    /// Cycles completed since construction
    pub current_cycle: u64,
    /// Epochs begun since construction
    pub current_epoch: u64,
    /// Wall-clock time of the most recent start
    pub started_at: Option<DateTime<Utc>>,
    /// Whether the tick loop is active
    pub running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_is_empty() {
        let state = HeartState::default();
        let snapshot = state.snapshot();

        assert_eq!(snapshot.current_cycle, 0);
        assert_eq!(snapshot.current_epoch, 0);
        assert!(snapshot.personality.is_none());
        assert!(snapshot.started_at.is_none());
        assert!(!snapshot.running);
    }

    #[test]
    fn test_begin_rolls_first_epoch() {
        let mut state = HeartState::default();
        let now = Instant::now();
        let wall = Utc::now();

        state.begin(now, wall);

        assert!(state.running);
        assert_eq!(state.current_epoch, 1);
        assert_eq!(state.current_cycle, 0);
        assert!(state.personality.is_some());
        assert_eq!(state.last_cycle_at, Some(now));
        assert_eq!(state.last_epoch_at, Some(now));
        assert_eq!(state.snapshot().started_at, Some(wall));
    }

    #[test]
    fn test_elapsed_and_wall_mapping() {
        let mut state = HeartState::default();
        let start = Instant::now();
        let wall = Utc::now();
        state.begin(start, wall);

        let later = start + Duration::from_secs(5);
        state.roll_cycle(later);

        let (epoch, cycle) = state.elapsed(start + Duration::from_secs(7));
        assert_eq!(epoch, Duration::from_secs(7));
        assert_eq!(cycle, Duration::from_secs(2));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.current_cycle, 1);
        assert_eq!(snapshot.last_cycle_at, Some(wall + chrono::Duration::seconds(5)));
        assert_eq!(snapshot.last_epoch_at, Some(wall));
    }

    #[test]
    fn test_new_epoch_replaces_personality() {
        let mut state = HeartState::default();
        let start = Instant::now();
        state.begin(start, Utc::now());
        let first = state.personality.clone().unwrap();

        let second = state.start_new_epoch(start + Duration::from_secs(1)).clone();

        assert_ne!(first.id, second.id);
        assert_eq!(state.current_epoch, 2);
        assert_eq!(state.personality, Some(second));
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut state = HeartState::default();
        state.begin(Instant::now(), Utc::now());

        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["current_epoch"], 1);
        assert_eq!(json["running"], true);
        assert_eq!(json["personality"]["public_id"].as_str().unwrap().len(), 8);
    }
}
