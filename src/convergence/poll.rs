use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::debug;

/// Deadline and pacing of a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub deadline: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(
        deadline: Duration,
        interval: Duration,
    ) -> Self {
        Self { deadline, interval }
    }
}

/// Result of one check
#[derive(Debug)]
pub enum PollStatus<T, S> {
    /// Stop polling with this value
    Ready(T),
    /// Keep polling; the observation, if any, is kept for diagnostics
    Pending(Option<S>),
}

#[derive(Debug)]
pub struct PollTimeout<S> {
    pub waited: Duration,
    pub attempts: u32,
    /// Most recent observation reported by a pending check
    pub last_observation: Option<S>,
}

/// Sleeps `interval`, runs `check`, repeats until it is ready or more than
/// `deadline` has elapsed since the call.
///
/// Elapsed time is measured on the monotonic clock. A check still running
/// when the deadline passes is abandoned.
pub async fn poll_until<T, S, F, Fut>(
    policy: PollPolicy,
    mut check: F,
) -> std::result::Result<T, PollTimeout<S>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStatus<T, S>>,
{
    let start = Instant::now();
    let mut attempts = 0;
    let mut last_observation = None;

    loop {
        sleep(policy.interval).await;

        let elapsed = start.elapsed();
        if elapsed > policy.deadline {
            return Err(PollTimeout {
                waited: elapsed,
                attempts,
                last_observation,
            });
        }

        attempts += 1;
        match timeout(policy.deadline - elapsed, check(attempts)).await {
            Ok(PollStatus::Ready(value)) => {
                debug!(attempts, elapsed_ms = start.elapsed().as_millis() as u64, "poll ready");
                return Ok(value);
            }
            Ok(PollStatus::Pending(observation)) => {
                if observation.is_some() {
                    last_observation = observation;
                }
            }
            Err(_) => debug!(attempts, "check abandoned at the deadline"),
        }
    }
}
