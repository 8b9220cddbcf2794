//! Fixed-interval tick clock for roomrelay's worker and hub loops.
//!
//! One scheduler drives one loop. The loop owns everything it ticks, so the
//! scheduler does no synchronization of its own. It only decides *when*
//! the next tick fires and keeps budget metrics.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* admin commands */ }
//!         info = scheduler.wait_for_tick() => {
//!             core.tick(drain(&mut events), info.dt);
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! `wait_for_tick` only mutates state after its sleep completes, so it is
//! safe to drop inside `select!`.

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the loop falls behind its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Forget the missed deadlines and schedule the next tick from now.
    #[default]
    Skip,
    /// Fire up to `max_catchup` late ticks back to back, then fall back to
    /// `Skip`.
    CatchUp {
        /// Hard cap on consecutive catch-up ticks.
        max_catchup: u32,
    },
}

#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. Also the `dt` handed to every simulation step.
    pub interval: Duration,
    pub policy: TickPolicy,
    /// Fraction of the interval (0.0–1.0) above which a tick's own work time
    /// is logged as a warning.
    pub budget_warn_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
        }
    }
}

impl TickConfig {
    /// Shortest interval accepted; anything below is clamped.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_secs_f64() * 1000.0,
                "tick interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info and metrics
// ---------------------------------------------------------------------------

/// Returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Starts at 1 and increases by one per fired tick.
    pub tick: u64,
    /// Always the configured interval, never wall-clock elapsed time.
    pub dt: Duration,
    /// The tick fired more than 10% of an interval late.
    pub overrun: bool,
    /// Deadlines dropped because of the overrun.
    pub ticks_skipped: u64,
}

/// Counters kept across the scheduler's lifetime.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of work time (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Work time of the last tick divided by the interval.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    next_tick: TokioInstant,
    /// Set when a tick fires, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Creates a scheduler whose first tick fires one interval from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        debug!(
            interval_ms = config.interval.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "tick scheduler created"
        );
        Self {
            next_tick: TokioInstant::now() + config.interval,
            config,
            tick_count: 0,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self::new(TickConfig::with_interval(interval))
    }

    /// Sleeps until the next deadline and returns the tick's info.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let deadline = self.next_tick;
        let interval = self.config.interval;
        time::sleep_until(deadline).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(deadline);
        let overrun = late_by > interval / 10;
        let behind = (late_by.as_nanos() / interval.as_nanos()) as u64;
        let mut ticks_skipped = 0;

        self.next_tick = match self.config.policy {
            TickPolicy::Skip => {
                if overrun && behind > 0 {
                    ticks_skipped = behind;
                    warn!(
                        tick = self.tick_count,
                        skipped = behind,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "tick overrun, skipping ahead"
                    );
                }
                now + interval
            }
            TickPolicy::CatchUp { max_catchup } => {
                if behind == 0 {
                    deadline + interval
                } else if behind <= u64::from(max_catchup) {
                    debug!(tick = self.tick_count, behind, "tick overrun, catching up");
                    deadline + interval
                } else {
                    ticks_skipped = behind - u64::from(max_catchup);
                    warn!(
                        tick = self.tick_count,
                        behind,
                        skipped = ticks_skipped,
                        "tick overrun beyond catch-up cap"
                    );
                    now + interval
                }
            }
        };

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;
        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            dt: interval,
            overrun,
            ticks_skipped,
        }
    }

    /// Marks the end of the current tick's work for budget tracking.
    ///
    /// A call without a preceding tick is ignored.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.config.interval.as_secs_f64();
        self.metrics.budget_utilization = utilization;

        if utilization >= 1.0 {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "tick exceeded its interval"
            );
        } else if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick approaching budget limit"
            );
        }

        self.metrics.max_tick_time = self.metrics.max_tick_time.max(elapsed);
        let prev = self.metrics.avg_tick_time.as_secs_f64();
        self.metrics.avg_tick_time =
            Duration::from_secs_f64(prev * 0.9 + elapsed.as_secs_f64() * 0.1);
    }

    /// Changes the cadence. The pending deadline is moved to one new
    /// interval after the last fired tick, or after now if that is earlier.
    pub fn set_interval(&mut self, interval: Duration) {
        let previous = self.config.interval;
        self.config.interval = interval.max(TickConfig::MIN_INTERVAL);
        let last = self.next_tick.checked_sub(previous).unwrap_or(self.next_tick);
        self.next_tick = (last + self.config.interval).max(TokioInstant::now());
        debug!(
            from_ms = previous.as_millis() as u64,
            to_ms = self.config.interval.as_millis() as u64,
            "tick interval changed"
        );
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
