use std::time::Duration;

use super::AcceptanceConfig;

/// Deadlines and intervals used by the suites, already multiplied by
/// `timeout_scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    pub scale: f64,
    pub poll_interval: Duration,
    pub election_deadline: Duration,
    pub rejoin_deadline: Duration,
    pub secondary_read_deadline: Duration,
    pub connect_timeout: Duration,
}

impl TimeoutPolicy {
    pub(super) fn from_config(config: &AcceptanceConfig) -> Self {
        let scale = config.timeout_scale;
        Self {
            scale,
            poll_interval: scaled(Duration::from_millis(config.poll_interval_ms), scale),
            election_deadline: scaled(Duration::from_secs(config.election_deadline_secs), scale),
            rejoin_deadline: scaled(Duration::from_secs(config.rejoin_deadline_secs), scale),
            secondary_read_deadline: scaled(
                Duration::from_secs(config.secondary_read_deadline_secs),
                scale,
            ),
            connect_timeout: scaled(Duration::from_secs(config.connect_timeout_secs), scale),
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_config(&AcceptanceConfig::default())
    }
}

/// Scale a duration, never below one millisecond.
pub fn scaled(
    base: Duration,
    scale: f64,
) -> Duration {
    let scaled = base.mul_f64(scale.max(0.0));
    scaled.max(Duration::from_millis(1))
}
