//! Controller timing and retry configuration.

use std::time::Duration;

/// Intervals for the background loops and the download retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Catalog poll period.
    pub catalog_interval: Duration,
    /// Presence keep-alive and roster refresh period.
    pub presence_interval: Duration,
    /// How often the download queue looks for items to start.
    pub queue_interval: Duration,
    /// How often the chat watchdog checks the connection.
    pub chat_health_interval: Duration,
    /// Server health check period.
    pub connection_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            catalog_interval: Duration::from_secs(10),
            presence_interval: Duration::from_secs(15),
            queue_interval: Duration::from_millis(150),
            chat_health_interval: Duration::from_secs(1),
            connection_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Bound on failed attempts to start a download.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Failed starts after which the download is stopped.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

/// Spacing between start attempts.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Backoff {
    /// Retry on every queue scan.
    #[default]
    Fixed,
    /// Wait `initial * factor^(n-1)` after the n-th failure, capped at `max`.
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after `failures` failed attempts (1-based).
    ///
    /// `None` means the next scan may retry immediately.
    pub fn delay_for_attempt(&self, failures: u32) -> Option<Duration> {
        match *self {
            Backoff::Fixed => None,
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                let exp = failures.saturating_sub(1).min(63) as i32;
                let secs = initial.as_secs_f64() * factor.powi(exp);
                Some(Duration::from_secs_f64(secs.min(max.as_secs_f64())))
            }
        }
    }
}
