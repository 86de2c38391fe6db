//! The heart's tick loop.

use chrono::Utc;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::hooks::{self, HeartHooks, HookKind, NoopHooks};
use super::observer::{Beat, BeatObserver, NoopObserver, ObserverSettings};
use super::personality::Personality;
use super::state::{HeartSnapshot, HeartState};
use crate::config::PulseConfig;
use crate::error::{PulseError, Result};

/// Builder for a [`Heart`].
pub struct HeartBuilder {
    config: PulseConfig,
    hooks: Arc<dyn HeartHooks>,
    observer: Arc<dyn BeatObserver>,
}

impl HeartBuilder {
    /// Start from a configuration, with hooks that never skip and no observer.
    pub fn new(config: &PulseConfig) -> Self {
        Self {
            config: config.clone(),
            hooks: Arc::new(NoopHooks),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Set the lifecycle hooks.
    pub fn hooks(mut self, hooks: Arc<dyn HeartHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set the beat observer.
    pub fn observer(mut self, observer: Arc<dyn BeatObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate the configuration and build the heart.
    ///
    /// With `heart.auto_start` set the heart is started before it is returned,
    /// which requires a Tokio runtime.
    pub fn build(self) -> Result<Heart> {
        self.config.validate()?;

        let heart = Heart {
            inner: Arc::new(Inner {
                beat_interval: self.config.beat_interval(),
                cycle_interval: self.config.cycle_interval(),
                epoch_interval: self.config.epoch_interval(),
                hook_timeout: self.config.hook_timeout(),
                config: self.config,
                hooks: self.hooks,
                observer: self.observer,
                state: Mutex::new(HeartState::default()),
                run: Mutex::new(None),
            }),
        };

        if heart.inner.config.heart.auto_start {
            heart.start()?;
        }
        Ok(heart)
    }
}

/// Periodic epoch/cycle scheduler.
///
/// Once started, the heart runs a single background task that ticks every
/// beat. The hooks of one tick are awaited in order and the next beat is only
/// armed once they have all resolved, so ticks never overlap and hooks always
/// observe settled counters.
///
/// Dropping the heart stops it.
pub struct Heart {
    inner: Arc<Inner>,
}

struct Inner {
    config: PulseConfig,
    beat_interval: Duration,
    cycle_interval: Duration,
    epoch_interval: Duration,
    hook_timeout: Option<Duration>,
    hooks: Arc<dyn HeartHooks>,
    observer: Arc<dyn BeatObserver>,
    state: Mutex<HeartState>,
    /// Lock order: `run` before `state`.
    run: Mutex<Option<TickTask>>,
}

/// The background task of one run, with its stop signal.
struct TickTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Heart {
    /// Build a heart with default hooks and no observer.
    pub fn new(config: &PulseConfig) -> Result<Self> {
        HeartBuilder::new(config).build()
    }

    /// Configure a heart with custom hooks or an observer.
    pub fn builder(config: &PulseConfig) -> HeartBuilder {
        HeartBuilder::new(config)
    }

    /// Start ticking.
    ///
    /// Rolls over the first epoch and spawns the tick task. The task reports
    /// the settings to the observer, then runs the first beat immediately.
    ///
    /// Fails with [`PulseError::AlreadyRunning`] while the heart is running,
    /// including while a tick from a previous run is still finishing, and
    /// with [`PulseError::Runtime`] outside a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PulseError::Runtime(e.to_string()))?;

        let mut run = self.inner.run.lock();
        if let Some(task) = run.as_ref() {
            if self.inner.state.lock().running || !task.handle.is_finished() {
                return Err(PulseError::AlreadyRunning);
            }
        }

        let settings = {
            let mut state = self.inner.state.lock();
            state.begin(Instant::now(), Utc::now());
            if let Some(personality) = state.personality.as_ref() {
                log_personality(personality);
            }
            ObserverSettings {
                epoch_interval_secs: self.inner.config.heart.epoch_interval_secs,
                cycle_interval_secs: self.inner.config.heart.cycle_interval_secs,
                started_at: state.started_wall().unwrap_or_else(Utc::now),
            }
        };

        info!(
            beat_interval_secs = self.inner.config.beat_interval_secs,
            cycle_interval_secs = settings.cycle_interval_secs,
            epoch_interval_secs = settings.epoch_interval_secs,
            "Heart started"
        );

        // Observer calls happen on the task so they never run under the `run` lock.
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(self.inner.clone().run(settings, stop_rx));
        *run = Some(TickTask { stop_tx, handle });
        Ok(())
    }

    /// Stop ticking. Does nothing if the heart is already stopped.
    ///
    /// A tick that is in flight completes, but no further beat is armed.
    pub fn stop(&self) {
        let run = self.inner.run.lock();
        {
            let mut state = self.inner.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
        }

        if let Some(task) = run.as_ref() {
            task.stop_tx.send_replace(true);
        }
        info!("Heart stopped");
    }

    /// Stop ticking and wait for the tick task to exit.
    pub async fn shutdown(&self) {
        self.stop();

        let task = self.inner.run.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Tick task ended abnormally");
            }
        }
    }

    /// Whether the heart is running.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// The current personality, if the heart was ever started.
    pub fn personality(&self) -> Option<Personality> {
        self.inner.state.lock().personality.clone()
    }

    /// The current cycle counter.
    pub fn current_cycle(&self) -> u64 {
        self.inner.state.lock().current_cycle
    }

    /// The current epoch counter.
    pub fn current_epoch(&self) -> u64 {
        self.inner.state.lock().current_epoch
    }

    /// Copy of the reportable state at call time.
    pub fn snapshot(&self) -> HeartSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// The configuration this heart was built with.
    pub fn config(&self) -> &PulseConfig {
        &self.inner.config
    }
}

impl Drop for Heart {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Heart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heart")
            .field("config", &self.inner.config)
            .field("state", &self.snapshot())
            .finish()
    }
}

impl Inner {
    async fn run(
        self: Arc<Self>,
        settings: ObserverSettings,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        self.notify_settings(&settings);

        while !*stop_rx.borrow() {
            self.tick().await;

            if *stop_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.beat_interval) => {}
                _ = stop_rx.changed() => break,
            }
        }
        debug!("Tick loop exited");
    }

    /// Run one beat: tick hook, observer, then any due rollovers.
    async fn tick(&self) {
        let current_cycle = self.state.lock().current_cycle;
        self.call(HookKind::Tick, self.hooks.on_tick(current_cycle)).await;

        let now = Instant::now();
        let (beat, cycle_due, epoch_due) = {
            let state = self.state.lock();
            let (elapsed_epoch, elapsed_cycle) = state.elapsed(now);
            let beat = Beat {
                epoch: state.current_epoch,
                cycle: state.current_cycle,
                started_at: state.started_wall().unwrap_or_else(Utc::now),
                pct_epoch: elapsed_epoch.as_secs_f64() / self.epoch_interval.as_secs_f64(),
                pct_cycle: elapsed_cycle.as_secs_f64() / self.cycle_interval.as_secs_f64(),
            };
            (
                beat,
                elapsed_cycle >= self.cycle_interval,
                elapsed_epoch >= self.epoch_interval,
            )
        };

        self.notify_beat(&beat);

        if !cycle_due {
            return;
        }
        if self.call(HookKind::Cycle, self.hooks.on_cycle(beat.cycle)).await {
            debug!(cycle = beat.cycle, "Cycle rollover deferred by hook");
            return;
        }

        let current_epoch = {
            let mut state = self.state.lock();
            state.roll_cycle(Instant::now());
            info!(cycle = state.current_cycle, "New cycle");
            state.current_epoch
        };

        if !epoch_due {
            return;
        }
        if self.call(HookKind::Epoch, self.hooks.on_epoch(current_epoch)).await {
            debug!(epoch = current_epoch, "Epoch rollover deferred by hook");
            return;
        }

        let mut state = self.state.lock();
        let personality = state.start_new_epoch(Instant::now()).clone();
        info!(epoch = state.current_epoch, "New epoch");
        log_personality(&personality);
    }

    /// Await a hook and return its skip signal. Failures count as "do not skip".
    async fn call<F>(&self, hook: HookKind, call: F) -> bool
    where
        F: std::future::Future<Output = anyhow::Result<bool>> + Send,
    {
        match hooks::invoke(hook, self.hook_timeout, call).await {
            Ok(skip) => skip,
            Err(e) => {
                warn!(error = %e, "Hook failed, proceeding without skip");
                false
            }
        }
    }

    fn notify_settings(&self, settings: &ObserverSettings) {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.observer.settings(settings)));
        report_observer(result);
    }

    fn notify_beat(&self, beat: &Beat) {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.observer.beat(beat)));
        report_observer(result);
    }
}

fn report_observer(result: std::thread::Result<Result<()>>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Beat observer failed"),
        Err(_) => warn!("Beat observer panicked"),
    }
}

fn log_personality(personality: &Personality) {
    info!(
        public_id = %personality.public_id,
        feature = %personality.feature,
        id = %personality.id,
        "New personality"
    );
}
