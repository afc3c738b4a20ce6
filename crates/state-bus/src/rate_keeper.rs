//! # Rate Keeper
//!
//! Paces a periodic loop to a fixed, absolute schedule and flags sustained
//! lag.
//!
//! ## Schedule
//!
//! Deadlines advance by exactly one interval per tick regardless of when the
//! loop actually woke up. A slow iteration therefore does not shift the
//! phase of later ones: the following ticks skip their sleep until the loop
//! is back on schedule.
//!
//! ## Lag Detection
//!
//! Each tick records the time since the previous tick into a bounded
//! history (seeded with one nominal interval). The loop is lagging while the
//! history mean exceeds `interval * lag_tolerance`, so one slow iteration is
//! absorbed and only chronic overload is reported.

use crate::config::RateKeeperConfig;
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Loop pacer with smoothed lag detection.
#[derive(Debug)]
pub struct RateKeeper {
    name: String,
    interval: Duration,
    config: RateKeeperConfig,
    history: VecDeque<Duration>,
    history_sum: Duration,
    next_deadline: Option<Instant>,
    last_tick: Option<Instant>,
    /// Seconds until the deadline at the last tick; negative when behind.
    remaining: f64,
    frame: u64,
    lagging: bool,
}

impl RateKeeper {
    /// Pace at `rate_hz` ticks per second.
    ///
    /// `rate_hz` must be positive; registry descriptors always are.
    #[must_use]
    pub fn new(name: impl Into<String>, rate_hz: f64) -> Self {
        let interval = Duration::try_from_secs_f64(1.0 / rate_hz).unwrap_or(Duration::ZERO);
        Self::with_interval(name, interval)
    }

    #[must_use]
    pub fn with_interval(name: impl Into<String>, interval: Duration) -> Self {
        Self::with_config(name, interval, RateKeeperConfig::default())
    }

    #[must_use]
    pub fn with_config(
        name: impl Into<String>,
        interval: Duration,
        config: RateKeeperConfig,
    ) -> Self {
        let capacity = config.history_capacity.max(1);
        let mut history = VecDeque::with_capacity(capacity + 1);
        history.push_back(interval);

        Self {
            name: name.into(),
            interval,
            config,
            history,
            history_sum: interval,
            next_deadline: None,
            last_tick: None,
            remaining: 0.0,
            frame: 0,
            lagging: false,
        }
    }

    /// Sleep until the next scheduled tick.
    ///
    /// Returns true while the loop is lagging.
    pub fn tick(&mut self) -> bool {
        let now = Instant::now();
        self.frame += 1;

        if let Some(previous) = self.last_tick.replace(now) {
            self.record(now.saturating_duration_since(previous));
        }

        // A deadline the clock cannot represent stays put instead of overflowing.
        let deadline = *self
            .next_deadline
            .get_or_insert_with(|| now.checked_add(self.interval).unwrap_or(now));
        self.remaining = signed_secs(deadline, now);
        self.next_deadline = Some(deadline.checked_add(self.interval).unwrap_or(deadline));

        if deadline > now {
            thread::sleep(deadline.saturating_duration_since(now));
        }

        let mean = self.mean_interval();
        self.lagging = mean.as_secs_f64() > self.interval.as_secs_f64() * self.config.lag_tolerance;

        if self.lagging {
            let shortfall = mean.saturating_sub(self.interval);
            let lag_ms = shortfall.as_secs_f64() * 1000.0;
            if shortfall > self.config.warn_threshold {
                warn!(
                    rate_keeper = %self.name,
                    frame = self.frame,
                    lag_ms,
                    "Loop lagging behind schedule"
                );
            } else {
                debug!(
                    rate_keeper = %self.name,
                    frame = self.frame,
                    lag_ms,
                    "Loop lagging behind schedule"
                );
            }
        }

        self.lagging
    }

    fn record(&mut self, elapsed: Duration) {
        self.history.push_back(elapsed);
        self.history_sum = self.history_sum.saturating_add(elapsed);
        while self.history.len() > self.config.history_capacity.max(1) {
            if let Some(oldest) = self.history.pop_front() {
                self.history_sum = self.history_sum.saturating_sub(oldest);
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks taken so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Mean of the recorded tick gaps.
    #[must_use]
    pub fn mean_interval(&self) -> Duration {
        // The history is never empty: it starts with the seed entry.
        self.history_sum / self.history.len().max(1) as u32
    }

    /// Lag state as of the last tick.
    #[must_use]
    pub fn is_lagging(&self) -> bool {
        self.lagging
    }

    /// Seconds to the deadline at the last tick; negative when behind.
    #[must_use]
    pub fn remaining(&self) -> f64 {
        self.remaining
    }
}

fn signed_secs(deadline: Instant, now: Instant) -> f64 {
    if deadline >= now {
        (deadline - now).as_secs_f64()
    } else {
        -(now - deadline).as_secs_f64()
    }
}
