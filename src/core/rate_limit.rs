//! Pacing for bursts of external calls.

use std::future::Future;
use std::time::Duration;

/// Decides how long to pause before the next external call.
pub trait RatePolicy {
    /// Called between two consecutive calls, never before the first.
    fn pause(&self) -> impl Future<Output = ()> + Send;
}

/// Sleep a fixed amount between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl RatePolicy for FixedDelay {
    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// No pacing at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoDelay;

impl RatePolicy for NoDelay {
    async fn pause(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_delay_sleeps_for_its_duration() {
        let policy = FixedDelay::from_millis(30);
        let before = std::time::Instant::now();
        policy.pause().await;
        assert!(before.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn no_delay_returns_immediately() {
        let before = std::time::Instant::now();
        NoDelay.pause().await;
        FixedDelay::new(Duration::ZERO).pause().await;
        assert!(before.elapsed() < Duration::from_millis(100));
    }
}
