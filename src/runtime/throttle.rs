//! Shared API throttle
//!
//! One ticker per provider, shared by every worker. The concurrency limit
//! bounds how many repos are in flight; the throttle bounds the aggregate
//! request rate across all of them.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};

/// A shared minimum spacing between calls
#[derive(Debug)]
pub struct Throttle {
    period: Duration,
    ticker: Option<Mutex<Interval>>,
}

impl Throttle {
    /// Allow one call per `period`. A zero period disables throttling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(period: Duration) -> Self {
        if period.is_zero() {
            return Self::unlimited();
        }
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            period,
            ticker: Some(Mutex::new(interval)),
        }
    }

    /// No throttling at all
    pub const fn unlimited() -> Self {
        Self {
            period: Duration::ZERO,
            ticker: None,
        }
    }

    /// Configured spacing
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next slot
    pub async fn tick(&self) {
        if let Some(ticker) = &self.ticker {
            ticker.lock().await.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_spaced_across_tasks() {
        let throttle = Arc::new(Throttle::new(Duration::from_millis(720)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let throttle = Arc::clone(&throttle);
            handles.push(tokio::spawn(async move {
                throttle.tick().await;
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap() - start);
        }
        times.sort();

        // First tick fires immediately, then one every period
        assert_eq!(times[0], Duration::ZERO);
        assert_eq!(times[3], Duration::from_millis(720 * 3));
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let throttle = Throttle::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            throttle.tick().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(throttle.period(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_zero_period_is_unlimited() {
        let throttle = Throttle::new(Duration::ZERO);
        assert!(throttle.ticker.is_none());
    }
}
