use serde::Deserialize;
use std::time::Duration;

/// Timing and duplicate-handling knobs shared by the orchestration processes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineSettings {
    /// Pause between consecutive remote submissions.
    #[serde(default = "default_submission_delay_ms")]
    pub submission_delay_ms: u64,
    /// Upper bound for a synchronous fetch to wait on one execution.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Skip a submission when the same query and date is already outstanding.
    #[serde(default = "default_skip_outstanding")]
    pub skip_outstanding: bool,
}

fn default_submission_delay_ms() -> u64 {
    1000
}

fn default_wait_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_skip_outstanding() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            submission_delay_ms: default_submission_delay_ms(),
            wait_timeout_secs: default_wait_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            skip_outstanding: default_skip_outstanding(),
        }
    }
}

impl PipelineSettings {
    pub fn submission_delay(&self) -> Duration {
        Duration::from_millis(self.submission_delay_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
