//! Lifecycle hooks driven by the heart.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::error::{PulseError, Result};

/// Application callbacks invoked from the tick loop.
///
/// Each hook resolves to a skip signal. Returning `Ok(true)` from
/// [`on_cycle`](HeartHooks::on_cycle) or [`on_epoch`](HeartHooks::on_epoch)
/// defers the pending rollover to the next beat; it is not cancelled. The
/// result of [`on_tick`](HeartHooks::on_tick) is informational.
///
/// A hook that errors, panics or exceeds the configured hook timeout is
/// logged and treated as `Ok(false)`, so a faulty hook never stops the heart.
#[async_trait]
pub trait HeartHooks: Send + Sync {
    /// Called at the start of every beat with the current cycle.
    async fn on_tick(&self, _current_cycle: u64) -> anyhow::Result<bool> {
        Ok(false)
    }

    /// Called when a cycle rollover is due.
    async fn on_cycle(&self, _current_cycle: u64) -> anyhow::Result<bool> {
        Ok(false)
    }

    /// Called when an epoch rollover is due, after the cycle rolled over.
    async fn on_epoch(&self, _current_epoch: u64) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Hooks that never skip.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl HeartHooks for NoopHooks {}

/// Identifies a hook in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// [`HeartHooks::on_tick`], once per beat
    Tick,
    /// [`HeartHooks::on_cycle`], when a cycle rollover is due
    Cycle,
    /// [`HeartHooks::on_epoch`], when an epoch rollover is due
    Epoch,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::Tick => write!(f, "on_tick"),
            HookKind::Cycle => write!(f, "on_cycle"),
            HookKind::Epoch => write!(f, "on_epoch"),
        }
    }
}

/// Await a hook, turning errors, panics and timeouts into [`PulseError::Hook`].
pub(crate) async fn invoke<F>(hook: HookKind, timeout: Option<Duration>, call: F) -> Result<bool>
where
    F: Future<Output = anyhow::Result<bool>> + Send,
{
    let guarded = AssertUnwindSafe(call).catch_unwind();

    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, guarded).await.map_err(|_| {
            PulseError::Hook {
                hook,
                reason: format!("timed out after {:?}", limit),
            }
        })?,
        None => guarded.await,
    };

    match outcome {
        Ok(Ok(skip)) => Ok(skip),
        Ok(Err(e)) => Err(PulseError::Hook {
            hook,
            reason: format!("{:#}", e),
        }),
        Err(payload) => Err(PulseError::Hook {
            hook,
            reason: format!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl HeartHooks for Failing {
        async fn on_cycle(&self, current_cycle: u64) -> anyhow::Result<bool> {
            anyhow::bail!("storage unavailable at cycle {}", current_cycle)
        }

        async fn on_epoch(&self, _current_epoch: u64) -> anyhow::Result<bool> {
            panic!("epoch hook exploded")
        }
    }

    #[tokio::test]
    async fn test_noop_hooks_never_skip() {
        let hooks = NoopHooks;
        assert!(!hooks.on_tick(0).await.unwrap());
        assert!(!hooks.on_cycle(1).await.unwrap());
        assert!(!hooks.on_epoch(2).await.unwrap());
    }

    #[tokio::test]
    async fn test_invoke_passes_skip_signal() {
        let skip = invoke(HookKind::Cycle, None, async { Ok::<_, anyhow::Error>(true) }).await;
        assert!(skip.unwrap());

        let skip = invoke(HookKind::Cycle, None, async { Ok::<_, anyhow::Error>(false) }).await;
        assert!(!skip.unwrap());
    }

    #[tokio::test]
    async fn test_invoke_reports_error() {
        let hooks = Failing;
        let result = invoke(HookKind::Cycle, None, hooks.on_cycle(7)).await;

        match result {
            Err(PulseError::Hook { hook, reason }) => {
                assert_eq!(hook, HookKind::Cycle);
                assert!(reason.contains("cycle 7"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invoke_catches_panic() {
        let hooks = Failing;
        let result = invoke(HookKind::Epoch, None, hooks.on_epoch(1)).await;

        match result {
            Err(PulseError::Hook { hook, reason }) => {
                assert_eq!(hook, HookKind::Epoch);
                assert!(reason.contains("epoch hook exploded"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, anyhow::Error>(true)
        };
        let result = invoke(HookKind::Tick, Some(Duration::from_secs(1)), slow).await;

        assert!(matches!(
            result,
            Err(PulseError::Hook {
                hook: HookKind::Tick,
                ..
            })
        ));
    }

    #[test]
    fn test_hook_kind_display() {
        assert_eq!(HookKind::Tick.to_string(), "on_tick");
        assert_eq!(HookKind::Cycle.to_string(), "on_cycle");
        assert_eq!(HookKind::Epoch.to_string(), "on_epoch");
    }
}
