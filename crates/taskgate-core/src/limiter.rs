//! RateLimiter - fixed window の admission control
//!
//! One bucket per (client identity, operation). Buckets are independent:
//! each lives in its own `DashMap` shard entry and is updated under that
//! entry's lock only.

use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::CoreError;
use crate::ports::Clock;

/// `max_requests` per `window`, e.g. `"5/minute"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LimitSpec {
    pub max_requests: u32,
    pub window: Duration,
}

impl LimitSpec {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub const fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

fn unit_window(unit: &str) -> Option<Duration> {
    let secs = match unit {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 60 * 60,
        "d" | "day" | "days" => 24 * 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

impl FromStr for LimitSpec {
    type Err = CoreError;

    /// Accepts `"N/unit"` and `"N per unit"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidLimitSpec(s.to_string());
        let trimmed = s.trim().to_ascii_lowercase();
        let (count, unit) = trimmed
            .split_once('/')
            .or_else(|| trimmed.split_once(" per "))
            .ok_or_else(invalid)?;

        let max_requests: u32 = count.trim().parse().map_err(|_| invalid())?;
        if max_requests == 0 {
            return Err(invalid());
        }
        let window = unit_window(unit.trim()).ok_or_else(invalid)?;
        Ok(Self::new(max_requests, window))
    }
}

impl fmt::Display for LimitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.window.as_secs();
        match secs {
            1 => write!(f, "{}/second", self.max_requests),
            60 => write!(f, "{}/minute", self.max_requests),
            3600 => write!(f, "{}/hour", self.max_requests),
            86400 => write!(f, "{}/day", self.max_requests),
            _ => write!(f, "{}/{}s", self.max_requests, secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    /// Budget exhausted; the window resets after `retry_after`.
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug)]
struct Bucket {
    window_start: DateTime<Utc>,
    window: chrono::Duration,
    count: u32,
}

impl Bucket {
    fn window_end(&self) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

pub struct RateLimiter {
    buckets: DashMap<(String, String), Bucket>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Count one request from `client` against `operation`'s budget.
    ///
    /// A denied request does not touch the counter, so `count` never exceeds
    /// `max_requests` within one window.
    pub fn admit(&self, client: &str, operation: &str, spec: LimitSpec) -> Admission {
        let now = self.clock.now();
        let window = chrono::Duration::from_std(spec.window).unwrap_or(chrono::Duration::MAX);
        let mut bucket = self
            .buckets
            .entry((client.to_string(), operation.to_string()))
            .or_insert_with(|| Bucket {
                window_start: now,
                window,
                count: 0,
            });

        if now >= bucket.window_end() {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.window = window;

        if bucket.count < spec.max_requests {
            bucket.count += 1;
            Admission::Allowed {
                remaining: spec.max_requests - bucket.count,
            }
        } else {
            let retry_after = (bucket.window_end() - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            Admission::Denied { retry_after }
        }
    }

    /// Drop buckets whose window has already elapsed. Returns how many went.
    pub fn purge_idle(&self) -> usize {
        let now = self.clock.now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| now < bucket.window_end());
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use rstest::rstest;

    fn limiter() -> (FixedClock, RateLimiter) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let limiter = RateLimiter::new(Arc::new(clock.clone()));
        (clock, limiter)
    }

    #[rstest]
    #[case("5/minute", 5, 60)]
    #[case("20/min", 20, 60)]
    #[case("10/m", 10, 60)]
    #[case("30 per minute", 30, 60)]
    #[case("1/second", 1, 1)]
    #[case("100/hour", 100, 3600)]
    #[case(" 2/Day ", 2, 86400)]
    fn parse_limit_spec(#[case] input: &str, #[case] max: u32, #[case] secs: u64) {
        let spec: LimitSpec = input.parse().unwrap();
        assert_eq!(spec, LimitSpec::new(max, Duration::from_secs(secs)));
    }

    #[rstest]
    #[case("")]
    #[case("5")]
    #[case("0/minute")]
    #[case("-1/minute")]
    #[case("five/minute")]
    #[case("5/fortnight")]
    fn parse_limit_spec_rejects(#[case] input: &str) {
        let err = input.parse::<LimitSpec>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidLimitSpec(_)));
    }

    #[test]
    fn display_round_trips_common_units() {
        assert_eq!(LimitSpec::per_minute(5).to_string(), "5/minute");
        assert_eq!("5/minute".parse::<LimitSpec>().unwrap().to_string(), "5/minute");
    }

    #[test]
    fn n_plus_one_is_denied_until_the_window_elapses() {
        let (clock, limiter) = limiter();
        let spec = LimitSpec::per_minute(5);

        for i in 0..5 {
            let admission = limiter.admit("10.0.0.1", "home", spec);
            assert_eq!(admission, Admission::Allowed { remaining: 4 - i });
        }

        clock.advance(Duration::from_secs(20));
        assert_eq!(
            limiter.admit("10.0.0.1", "home", spec),
            Admission::Denied {
                retry_after: Duration::from_secs(40)
            }
        );

        clock.advance(Duration::from_secs(41));
        assert!(limiter.admit("10.0.0.1", "home", spec).is_allowed());
    }

    #[test]
    fn window_resets_exactly_at_the_boundary() {
        let (clock, limiter) = limiter();
        let spec = LimitSpec::per_minute(1);

        assert!(limiter.admit("c", "op", spec).is_allowed());
        clock.advance(Duration::from_secs(59));
        assert!(!limiter.admit("c", "op", spec).is_allowed());
        clock.advance(Duration::from_secs(1));
        assert!(limiter.admit("c", "op", spec).is_allowed());
    }

    #[test]
    fn buckets_are_independent_per_client_and_operation() {
        let (_clock, limiter) = limiter();
        let spec = LimitSpec::per_minute(1);

        assert!(limiter.admit("a", "submit", spec).is_allowed());
        assert!(!limiter.admit("a", "submit", spec).is_allowed());

        assert!(limiter.admit("a", "status", spec).is_allowed());
        assert!(limiter.admit("b", "submit", spec).is_allowed());
        assert_eq!(limiter.len(), 3);
    }

    #[test]
    fn purge_idle_drops_only_elapsed_windows() {
        let (clock, limiter) = limiter();
        limiter.admit("a", "op", LimitSpec::per_minute(5));
        limiter.admit("b", "op", LimitSpec::new(5, Duration::from_secs(3600)));

        clock.advance(Duration::from_secs(60));

        assert_eq!(limiter.purge_idle(), 1);
        assert_eq!(limiter.len(), 1);
    }
}
