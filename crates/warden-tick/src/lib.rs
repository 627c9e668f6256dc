//! Timing primitives for Lobby Warden.
//!
//! Two kinds of timers drive a live lobby:
//!
//! - [`TickScheduler`]: a fixed-interval ticker. Each server binding owns
//!   one and runs a whitelist verification pass per tick.
//! - [`DeferredTask`]: a one-shot, cancellable action with a single-fire
//!   guard. Used for the "reconnect or be replaced" grace window.
//!
//! # Integration
//!
//! The scheduler is meant to sit in a `tokio::select!` next to a
//! cancellation branch:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = cancel.cancelled() => break,
//!         _ = scheduler.wait_for_tick() => {
//!             verify().await;
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

mod deferred;

pub use deferred::{DeferredTask, FireGuard};

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`TickScheduler`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. `Duration::ZERO` disables the scheduler:
    /// [`TickScheduler::wait_for_tick`] then pends forever. So does a
    /// period too long to land on the clock.
    pub period: Duration,
    /// Fraction of `period` (0.0–1.0) after which a slow pass is logged.
    pub budget_warn_threshold: f64,
    /// Upper bound of the random delay added to the first tick, so
    /// bindings started in the same instant don't all hit their servers
    /// together.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10),
            budget_warn_threshold: 0.8,
            initial_jitter: Duration::from_millis(500),
        }
    }
}

impl TickConfig {
    /// A config with the given period and default everything else.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        if self.initial_jitter > self.period {
            self.initial_jitter = self.period;
        }
        self
    }

    /// `true` if this config never ticks.
    pub fn is_disabled(&self) -> bool {
        self.period.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval tick scheduler. One per server binding.
///
/// A tick that fires late does not try to catch up: missed periods are
/// dropped and the next tick is scheduled a full period after the late one.
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    next_tick: Option<TokioInstant>,
    /// Wall-clock start of the pass for the current tick; consumed by
    /// `record_tick_end`.
    tick_start: Option<Instant>,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();

        let next_tick = if config.is_disabled() {
            debug!("tick scheduler created disabled");
            None
        } else {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max = config.initial_jitter.as_millis() as u64;
                Duration::from_millis(rand::rng().random_range(0..=max))
            };
            debug!(period = ?config.period, ?jitter, "tick scheduler created");
            TokioInstant::now().checked_add(config.period.saturating_add(jitter))
        };

        Self {
            config,
            tick_count: 0,
            next_tick,
            tick_start: None,
        }
    }

    /// A scheduler with the given period and no initial jitter.
    pub fn with_period(period: Duration) -> Self {
        Self::new(TickConfig {
            initial_jitter: Duration::ZERO,
            ..TickConfig::with_period(period)
        })
    }

    /// Waits until the next tick is due and returns its number, starting
    /// at 1.
    ///
    /// Pends forever when disabled, which lets a surrounding `select!`
    /// keep serving its other branches.
    pub async fn wait_for_tick(&mut self) -> u64 {
        let period = self.config.period;
        let Some(next) = self.next_tick else {
            return std::future::pending().await;
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
        if skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped,
                late_ms = late_by.as_millis() as u64,
                "tick overrun, skipping ahead"
            );
        }
        // A period too large to represent never ticks again.
        self.next_tick = now.checked_add(period);
        trace!(tick = self.tick_count, "tick fired");

        self.tick_count
    }

    /// Marks the end of the work done for the current tick.
    ///
    /// Logs a warning when the pass used more than the configured share of
    /// the period. Does nothing if no tick is in progress.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        if self.config.is_disabled() {
            return;
        }
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.config.period.as_secs_f64();
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = self.config.period.as_millis() as u64,
                "tick work is approaching its period"
            );
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.config.is_disabled()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
