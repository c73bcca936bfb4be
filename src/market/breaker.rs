//! Circuit breaker for the market discovery API
//!
//! Opens after consecutive failures and stays open for a backoff that
//! doubles on every trip, up to a ceiling.

use chrono::{DateTime, Duration, Utc};

const TRIP_AFTER_FAILURES: u32 = 3;
const INITIAL_BACKOFF_SECS: i64 = 15;
const MAX_BACKOFF_SECS: i64 = 600;

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failures: u32,
    open_until: Option<DateTime<Utc>>,
    backoff: Duration,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            failures: 0,
            open_until: None,
            backoff: Duration::seconds(INITIAL_BACKOFF_SECS),
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.open_until.is_some_and(|until| now < until)
    }

    pub fn open_until(&self) -> Option<DateTime<Utc>> {
        self.open_until
    }

    pub fn on_success(&mut self) {
        self.failures = 0;
        self.open_until = None;
        self.backoff = Duration::seconds(INITIAL_BACKOFF_SECS);
    }

    pub fn on_failure(&mut self, now: DateTime<Utc>) {
        self.failures += 1;
        if self.failures >= TRIP_AFTER_FAILURES {
            self.open_until = Some(now + self.backoff);
            self.backoff = (self.backoff * 2).min(Duration::seconds(MAX_BACKOFF_SECS));
            tracing::warn!(
                failures = self.failures,
                open_until = ?self.open_until,
                "Market API circuit opened"
            );
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_after_three_failures() {
        let mut breaker = CircuitBreaker::new();
        let now = Utc::now();

        breaker.on_failure(now);
        breaker.on_failure(now);
        assert!(!breaker.is_open(now));

        breaker.on_failure(now);
        assert!(breaker.is_open(now));
        assert!(!breaker.is_open(now + Duration::seconds(15)));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut breaker = CircuitBreaker::new();
        let now = Utc::now();

        for _ in 0..3 {
            breaker.on_failure(now);
        }
        assert_eq!(breaker.open_until(), Some(now + Duration::seconds(15)));

        breaker.on_failure(now);
        assert_eq!(breaker.open_until(), Some(now + Duration::seconds(30)));

        for _ in 0..10 {
            breaker.on_failure(now);
        }
        assert_eq!(breaker.open_until(), Some(now + Duration::seconds(600)));
    }

    #[test]
    fn test_success_resets() {
        let mut breaker = CircuitBreaker::new();
        let now = Utc::now();
        for _ in 0..4 {
            breaker.on_failure(now);
        }
        breaker.on_success();
        assert!(!breaker.is_open(now));

        for _ in 0..3 {
            breaker.on_failure(now);
        }
        assert_eq!(breaker.open_until(), Some(now + Duration::seconds(15)));
    }
}
