//! Periodic probe timer for authsync.
//!
//! The timer is the core's only retry mechanism: a failed probe is never
//! retried on the spot, the next poll simply tries again. It also catches
//! server-side changes nobody told us about (a logout on another device).
//!
//! # Disabled mode
//!
//! When `interval` is zero, [`PollScheduler::wait_for_poll`] pends
//! forever. The driver keeps its `select!` loop unchanged and only
//! reacts to storage changes and commands.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* visibility, shutdown */ }
//!         _ = scheduler.wait_for_poll() => {
//!             core.probe_and_apply().await;
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the poll scheduler.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between polls. Zero disables polling. Default: 45 s.
    pub interval: Duration,
    /// Random extra delay (0..max) before the *first* poll, so instances
    /// started together (tabs restored after a browser restart) don't
    /// all hit the authority at once. Default: 2 s.
    pub initial_jitter: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(45),
            initial_jitter: Duration::from_secs(2),
        }
    }
}

impl PollConfig {
    /// Shortest interval accepted.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(5);

    /// Config polling every `interval` with default jitter.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Config that never polls.
    pub fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            initial_jitter: Duration::ZERO,
        }
    }

    /// Clamps out-of-range values. Called by [`PollScheduler::new`].
    ///
    /// - a non-zero `interval` below [`Self::MIN_INTERVAL`] is raised to it
    /// - `initial_jitter` is capped at `interval`
    pub fn validated(mut self) -> Self {
        if !self.interval.is_zero() && self.interval < Self::MIN_INTERVAL {
            tracing::warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "poll interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.initial_jitter > self.interval {
            self.initial_jitter = self.interval;
        }
        self
    }

    /// `false` when polling is disabled.
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Poll info
// ---------------------------------------------------------------------------

/// Returned by [`PollScheduler::wait_for_poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInfo {
    /// Monotonically increasing poll number (starts at 1).
    pub poll: u64,
    /// Whole intervals that passed without a poll (the runtime was busy or
    /// the host was asleep). Missed polls are not made up.
    pub missed: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fires once per interval, pausable.
pub struct PollScheduler {
    config: PollConfig,
    next_poll: Option<Instant>,
    poll_count: u64,
    paused: bool,
}

impl PollScheduler {
    /// Creates a scheduler. The first poll is one interval plus jitter away.
    pub fn new(config: PollConfig) -> Self {
        let config = config.validated();

        let next_poll = config.is_enabled().then(|| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max = config.initial_jitter.as_millis() as u64;
                Duration::from_millis(rand::rng().random_range(0..max.max(1)))
            };
            Instant::now() + config.interval + jitter
        });

        if config.is_enabled() {
            debug!(
                interval_secs = config.interval.as_secs_f64(),
                "poll scheduler created"
            );
        } else {
            debug!("poll scheduler created with polling disabled");
        }

        Self {
            config,
            next_poll,
            poll_count: 0,
            paused: false,
        }
    }

    /// Waits until the next poll is due.
    ///
    /// Pends forever while paused or disabled. Cancel-safe: dropping the
    /// future inside `select!` loses nothing.
    pub async fn wait_for_poll(&mut self) -> PollInfo {
        let next = match self.next_poll {
            Some(next) if !self.paused => next,
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        let interval = self.config.interval;
        let late_by = now.saturating_duration_since(next);
        let missed = (late_by.as_nanos() / interval.as_nanos()) as u64;
        if missed > 0 {
            debug!(missed, "polls missed, skipping ahead");
        }

        self.poll_count += 1;
        self.next_poll = Some(now + interval);
        trace!(poll = self.poll_count, "poll due");

        PollInfo {
            poll: self.poll_count,
            missed,
        }
    }

    /// Pushes the next poll a full interval out from now. Call after an
    /// out-of-band probe so the timer doesn't fire right behind it.
    pub fn reset(&mut self) {
        if self.config.is_enabled() {
            self.next_poll = Some(Instant::now() + self.config.interval);
        }
    }

    /// Stops polling until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(poll = self.poll_count, "polling paused");
        }
    }

    /// Resumes polling; the next poll is one interval from now. Idempotent.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.reset();
            debug!(poll = self.poll_count, "polling resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Polls fired so far.
    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}
