//! Runtime configuration for hubs, publishers and rate keepers.

use crate::codec::{BincodeCodec, Codec};
use crate::transport::{TcpTransport, Transport};
use crate::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_STALENESS_FACTOR};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Subscriber-side tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    /// Bounded receive timeout of each worker; also the shutdown latency.
    pub poll_interval: Duration,

    /// Nominal periods of silence tolerated before a channel is stale (K).
    pub staleness_factor: f64,

    /// Minimum gap between two staleness warnings for one channel.
    pub stale_warning_interval: Duration,

    /// How long `close()` waits for each worker before leaking it.
    pub join_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            staleness_factor: DEFAULT_STALENESS_FACTOR,
            stale_warning_interval: Duration::from_secs(1),
            join_timeout: Duration::from_secs(1),
        }
    }
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `STATE_BUS_POLL_INTERVAL_MS`: worker receive timeout (default: 100)
    /// - `STATE_BUS_STALENESS_FACTOR`: K in `K / rate_hz` (default: 10)
    /// - `STATE_BUS_STALE_WARNING_MS`: staleness warning throttle (default: 1000)
    /// - `STATE_BUS_JOIN_TIMEOUT_MS`: bounded join on close (default: 1000)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            poll_interval: env_millis("STATE_BUS_POLL_INTERVAL_MS")
                .unwrap_or(defaults.poll_interval),

            staleness_factor: env::var("STATE_BUS_STALENESS_FACTOR")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|k| is_valid_staleness_factor(*k))
                .unwrap_or(defaults.staleness_factor),

            stale_warning_interval: env_millis("STATE_BUS_STALE_WARNING_MS")
                .unwrap_or(defaults.stale_warning_interval),

            join_timeout: env_millis("STATE_BUS_JOIN_TIMEOUT_MS")
                .unwrap_or(defaults.join_timeout),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set K. Non-finite or non-positive factors are ignored.
    #[must_use]
    pub fn with_staleness_factor(mut self, staleness_factor: f64) -> Self {
        if is_valid_staleness_factor(staleness_factor) {
            self.staleness_factor = staleness_factor;
        }
        self
    }

    #[must_use]
    pub fn with_stale_warning_interval(mut self, interval: Duration) -> Self {
        self.stale_warning_interval = interval;
        self
    }

    #[must_use]
    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }
}

fn is_valid_staleness_factor(k: f64) -> bool {
    k.is_finite() && k > 0.0
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Pacing and lag detection tuning for [`crate::RateKeeper`].
///
/// Independent of [`BusConfig::staleness_factor`].
#[derive(Debug, Clone, PartialEq)]
pub struct RateKeeperConfig {
    /// Inter-tick samples averaged for lag detection.
    pub history_capacity: usize,

    /// Lagging when the mean tick gap exceeds `interval * lag_tolerance`.
    pub lag_tolerance: f64,

    /// Shortfalls above this are logged at `warn`, below at `debug`.
    pub warn_threshold: Duration,
}

impl Default for RateKeeperConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            lag_tolerance: 1.10,
            warn_threshold: Duration::ZERO,
        }
    }
}

/// Collaborators shared by publishers and hubs.
///
/// Construct once and pass to [`crate::Publisher::open_with`] and
/// [`crate::SubscriberHub::open_with`].
#[derive(Clone)]
pub struct BusContext {
    pub codec: Arc<dyn Codec>,
    pub transport: Arc<dyn Transport>,
    pub config: BusConfig,
}

impl BusContext {
    #[must_use]
    pub fn new(codec: Arc<dyn Codec>, transport: Arc<dyn Transport>, config: BusConfig) -> Self {
        Self {
            codec,
            transport,
            config,
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }
}

impl Default for BusContext {
    /// Bincode over loopback TCP, configured from the environment.
    fn default() -> Self {
        Self {
            codec: Arc::new(BincodeCodec::new()),
            transport: Arc::new(TcpTransport::new()),
            config: BusConfig::from_env(),
        }
    }
}

impl std::fmt::Debug for BusContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusContext")
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .finish()
    }
}
