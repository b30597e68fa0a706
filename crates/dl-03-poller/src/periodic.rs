//! Interval runner.
//!
//! Two locks guard a [`Periodic`]:
//!
//! - `run_lock` (async) is held for the whole duration of a run, so runs are
//!   mutually exclusive and "wait for the in-flight run" means acquiring it.
//! - `state` (sync) holds flags, counters and the scheduled timer. It is
//!   never held across an `.await`.
//!
//! Each scheduled timer carries the generation it was created in. Any
//! reschedule, trigger or disable bumps the generation, so a timer that has
//! already fired but lost the race simply exits.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::error::PollerError;

/// Boxed task body. Receives a handle to the poller running it.
pub type PeriodicTask = Arc<dyn Fn(Periodic) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Observer for task failures (errors and panics).
pub type ErrorHandler = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Construction options.
#[derive(Debug, Clone, Default)]
pub struct PeriodicOptions {
    /// Run immediately when enabled instead of waiting one interval
    pub run_on_start: bool,
    /// Stop scheduling after this many runs (counted since last enable)
    pub max_runs: Option<u64>,
    /// Enable at construction
    pub enabled: bool,
}

struct State {
    enabled: bool,
    interval: Duration,
    runs: u64,
    running: bool,
    timer: Option<AbortHandle>,
    generation: u64,
    on_error: Option<ErrorHandler>,
}

struct Inner {
    task: PeriodicTask,
    run_on_start: bool,
    max_runs: Option<u64>,
    state: Mutex<State>,
    run_lock: tokio::sync::Mutex<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}

/// Handle to a periodic task. Clones share the same schedule.
#[derive(Clone)]
pub struct Periodic {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Periodic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Periodic")
            .field("enabled", &state.enabled)
            .field("interval", &state.interval)
            .field("runs", &state.runs)
            .field("running", &state.running)
            .finish()
    }
}

impl Periodic {
    /// Create a poller for `task`.
    ///
    /// With `options.enabled` the first run is scheduled right away, which
    /// requires a Tokio runtime.
    pub fn new<F, Fut>(task: F, interval: Duration, options: PeriodicOptions) -> Result<Self, PollerError>
    where
        F: Fn(Periodic) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        validate_interval(interval)?;

        let task: PeriodicTask = Arc::new(move |periodic| task(periodic).boxed());
        let periodic = Self {
            inner: Arc::new(Inner {
                task,
                run_on_start: options.run_on_start,
                max_runs: options.max_runs,
                state: Mutex::new(State {
                    enabled: false,
                    interval,
                    runs: 0,
                    running: false,
                    timer: None,
                    generation: 0,
                    on_error: None,
                }),
                run_lock: tokio::sync::Mutex::new(()),
            }),
        };

        if options.enabled {
            periodic.inner.state.lock().enabled = true;
            if options.run_on_start {
                drop(periodic.spawn_run());
            } else {
                periodic.schedule(interval);
            }
        }

        Ok(periodic)
    }

    /// Install an observer for task failures.
    pub fn set_error_handler<H>(&self, handler: H)
    where
        H: Fn(&anyhow::Error) + Send + Sync + 'static,
    {
        self.inner.state.lock().on_error = Some(Arc::new(handler));
    }

    /// Builder form of [`Periodic::set_error_handler`].
    pub fn with_error_handler<H>(self, handler: H) -> Self
    where
        H: Fn(&anyhow::Error) + Send + Sync + 'static,
    {
        self.set_error_handler(handler);
        self
    }

    /// Start (or re-arm) the schedule.
    ///
    /// Going from disabled to enabled resets the run counter and, with
    /// `run_on_start`, runs the task before returning. When already enabled
    /// the schedule restarts with the (possibly new) interval; an in-flight
    /// run reschedules on its own when it settles.
    pub async fn enable(&self, interval: Option<Duration>) -> Result<(), PollerError> {
        if let Some(interval) = interval {
            validate_interval(interval)?;
        }

        let run_now = {
            let mut state = self.inner.state.lock();
            if let Some(interval) = interval {
                state.interval = interval;
            }
            let newly_enabled = !state.enabled;
            if newly_enabled {
                state.enabled = true;
                state.runs = 0;
                debug!(interval_ms = state.interval.as_millis() as u64, "Periodic task enabled");
            }
            let run_now = newly_enabled && self.inner.run_on_start;
            if !run_now && !state.running {
                let delay = state.interval;
                self.schedule_locked(&mut state, delay);
            }
            run_now
        };

        if run_now {
            let _ = self.spawn_run().await;
        }
        Ok(())
    }

    /// Stop scheduling and wait for the in-flight run, if any.
    ///
    /// Must not be awaited from inside the task itself.
    pub async fn disable(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.enabled {
                debug!(runs = state.runs, "Periodic task disabled");
            }
            state.enabled = false;
            cancel_timer(&mut state);
        }
        let _settled = self.inner.run_lock.lock().await;
    }

    /// Run now, after any in-flight run. No-op when disabled.
    ///
    /// Must not be awaited from inside the task itself.
    pub async fn trigger(&self) {
        if !self.is_enabled() {
            return;
        }
        let _ = self.spawn_run().await;
    }

    /// Postpone the next run by `duration`, counted from when the in-flight
    /// run (if any) settles. Safe to call from inside the task.
    pub fn suspend(&self, duration: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            let _settled = this.inner.run_lock.lock().await;
            let mut state = this.inner.state.lock();
            debug!(delay_ms = duration.as_millis() as u64, "Periodic task suspended");
            this.schedule_locked(&mut state, duration);
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().enabled
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Runs started since the last transition to enabled.
    pub fn run_count(&self) -> u64 {
        self.inner.state.lock().runs
    }

    pub fn interval(&self) -> Duration {
        self.inner.state.lock().interval
    }

    fn schedule(&self, delay: Duration) {
        let mut state = self.inner.state.lock();
        self.schedule_locked(&mut state, delay);
    }

    fn schedule_locked(&self, state: &mut State, delay: Duration) {
        cancel_timer(state);
        if !state.enabled || self.limit_reached(state) {
            return;
        }

        let generation = state.generation;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Periodic { inner }.run_exclusive(Some(generation)).await;
            }
        });
        state.timer = Some(timer.abort_handle());
    }

    fn limit_reached(&self, state: &State) -> bool {
        self.inner.max_runs.is_some_and(|max| state.runs >= max)
    }

    /// Run on a separate task so that a caller dropping its future cannot
    /// cut a run short.
    fn spawn_run(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_exclusive(None).await })
    }

    /// Execute one run under the run lock, then schedule the next.
    ///
    /// `generation` is `Some` for timer-driven runs, which are skipped if
    /// the schedule changed after the timer was armed.
    async fn run_exclusive(&self, generation: Option<u64>) {
        let _run = self.inner.run_lock.lock().await;

        let on_error = {
            let mut state = self.inner.state.lock();
            if !state.enabled || self.limit_reached(&state) {
                return;
            }
            match generation {
                Some(expected) if expected != state.generation => return,
                // Our own timer: forget it without aborting ourselves
                Some(_) => {
                    state.timer = None;
                    state.generation = state.generation.wrapping_add(1);
                }
                None => cancel_timer(&mut state),
            }
            state.running = true;
            state.runs += 1;
            state.on_error.clone()
        };

        let outcome = AssertUnwindSafe((self.inner.task)(self.clone()))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(panic) => Some(anyhow::anyhow!("task panicked: {}", panic_message(&*panic))),
        };
        if let Some(error) = failure {
            warn!(error = %error, "Periodic task failed");
            if let Some(handler) = on_error {
                handler(&error);
            }
        }

        let mut state = self.inner.state.lock();
        state.running = false;
        let delay = state.interval;
        self.schedule_locked(&mut state, delay);
    }
}

fn cancel_timer(state: &mut State) {
    state.generation = state.generation.wrapping_add(1);
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
}

fn validate_interval(interval: Duration) -> Result<(), PollerError> {
    if interval.is_zero() {
        return Err(PollerError::InvalidInterval(interval));
    }
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
