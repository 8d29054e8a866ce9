use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::Deserialize;
use std::time::Duration;

/// Bounded exponential backoff applied to every remote call.
///
/// With the defaults a call is attempted at most four times, sleeping
/// 1000 ms, 2000 ms and 4000 ms between attempts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_backoff_multiplier() -> u32 {
    2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Fresh, unjittered backoff schedule for one call.
    ///
    /// The caller stops after `max_retries` intervals and sleeps on its own
    /// clock; the schedule itself never runs out.
    pub fn backoff(&self) -> ExponentialBackoff {
        let max_interval = Duration::from_millis(self.max_delay_ms);
        let initial_interval = Duration::from_millis(self.initial_delay_ms).min(max_interval);
        ExponentialBackoffBuilder::new()
            .with_initial_interval(initial_interval)
            .with_multiplier(f64::from(self.backoff_multiplier))
            .with_randomization_factor(0.0)
            .with_max_interval(max_interval)
            .with_max_elapsed_time(None)
            .build()
    }
}
