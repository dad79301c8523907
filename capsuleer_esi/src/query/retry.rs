use std::time::Duration;

use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first request.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on how long a server hint may make us wait.
    pub max_hint: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_hint: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// `attempts` counts the requests already made.
    pub fn next_delay(&self, attempts: u32, server_hint: Option<Duration>) -> RetryDecision {
        if attempts >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let backoff = exponential_backoff(attempts, self.base_delay, self.max_delay);
        let delay = match server_hint {
            Some(hint) => backoff.max(hint.min(self.max_hint)),
            None => backoff,
        };
        RetryDecision::RetryAfter(delay)
    }
}

fn exponential_backoff(attempts: u32, initial: Duration, max: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1).min(31);
    let factor = 1_u128 << exponent;
    let initial_ms = initial.as_millis();
    let max_ms = max.as_millis();
    let backoff_ms = initial_ms.saturating_mul(factor).min(max_ms);
    Duration::from_millis(backoff_ms as u64)
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
