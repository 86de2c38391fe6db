//! Heartbeat scheduler.
//!
//! The [`Heart`] ticks once per beat, rolls cycles over every
//! `cycle_interval_secs` and epochs over every `epoch_interval_secs`. Each
//! epoch rollover gives the node a fresh [`Personality`]. Applications hook
//! into the rollovers through [`HeartHooks`] and watch the beats through a
//! [`BeatObserver`].

mod hooks;
mod observer;
mod personality;
mod scheduler;
mod state;

pub use hooks::{HeartHooks, HookKind, NoopHooks};
pub use observer::{Beat, BeatObserver, LogObserver, NoopObserver, ObserverSettings};
pub use personality::{Personality, PUBLIC_ID_LEN};
pub use scheduler::{Heart, HeartBuilder};
pub use state::HeartSnapshot;
