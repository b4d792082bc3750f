//! Exponential backoff with jitter.
//!
//! Strategies follow the usual "exponential backoff and jitter" family:
//! plain exponential, full, equal and decorrelated jitter. A server's
//! `Retry-After` hint on 429/503 responses always wins over the computed wait.

use crate::Response;
use chrono::{DateTime, Utc};
use http::StatusCode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Default minimum wait between attempts.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_millis(100);
/// Default maximum wait between attempts.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(3000);
/// Default growth factor of the exponential envelope.
pub const DEFAULT_GROWTH: f64 = 1.5;

/// Jitter strategy applied to the exponential envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterStrategy {
    /// Plain exponential backoff.
    WithoutJitter,
    /// Uniform in `[0, exp)`.
    FullJitter,
    /// `exp / 2` plus uniform in `[0, exp / 2)`.
    #[default]
    EqualJitter,
    /// `min(max, min + uniform [0, 3 * previous - min))`.
    DecorrelatedJitter,
}

/// Backoff calculator.
///
/// Holds the random source and, for [`JitterStrategy::DecorrelatedJitter`],
/// the previous wait. Use one instance across all attempts of one request so
/// the decorrelation memory carries over; [`Backoff::fresh`] starts a new
/// sequence.
///
/// A `Retry-After` hint is not bounded by [`max_wait`](Backoff::max_wait)
/// and may be arbitrarily long. Set a request deadline, or cap hints with
/// [`with_retry_after_cap`](Backoff::with_retry_after_cap).
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    growth: f64,
    strategy: JitterStrategy,
    retry_after_cap: Option<Duration>,
    prev: Duration,
    rng: StdRng,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_WAIT, DEFAULT_MAX_WAIT, JitterStrategy::default())
    }
}

impl Backoff {
    /// Create a backoff calculator. Zero bounds fall back to the defaults.
    pub fn new(min: Duration, max: Duration, strategy: JitterStrategy) -> Self {
        let min = if min.is_zero() { DEFAULT_MIN_WAIT } else { min };
        let max = if max.is_zero() { DEFAULT_MAX_WAIT } else { max };
        Self {
            min,
            max: max.max(min),
            growth: DEFAULT_GROWTH,
            strategy,
            retry_after_cap: None,
            prev: Duration::ZERO,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Set the growth factor of the exponential envelope (must exceed 1).
    pub fn with_growth(mut self, growth: f64) -> Self {
        if growth.is_finite() && growth > 1.0 {
            self.growth = growth;
        }
        self
    }

    /// Never wait longer than `cap` on a server's `Retry-After` hint.
    pub fn with_retry_after_cap(mut self, cap: Duration) -> Self {
        self.retry_after_cap = Some(cap);
        self
    }

    /// Seed the random source, for reproducible sequences.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// A new calculator with the same settings, no memory and a new seed.
    pub fn fresh(&self) -> Self {
        Self {
            prev: Duration::ZERO,
            rng: StdRng::from_rng(&mut rand::rng()),
            ..self.clone()
        }
    }

    /// Minimum wait.
    pub fn min_wait(&self) -> Duration {
        self.min
    }

    /// Maximum wait.
    pub fn max_wait(&self) -> Duration {
        self.max
    }

    /// Jitter strategy.
    pub fn strategy(&self) -> JitterStrategy {
        self.strategy
    }

    /// Compute the wait before the attempt following `attempt`.
    ///
    /// A parsable `Retry-After` on a 429 or 503 `prior` response is returned
    /// as is, subject only to the optional hint cap.
    pub fn next_wait(&mut self, prior: Option<&Response>, attempt: u32) -> Duration {
        if let Some(response) = prior
            && matches!(
                response.status(),
                StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
            )
            && let Some(delay) = response
                .header(http::header::RETRY_AFTER.as_str())
                .and_then(parse_retry_after)
        {
            return match self.retry_after_cap {
                Some(cap) => delay.min(cap),
                None => delay,
            };
        }

        let exp = self.envelope(attempt);
        let jittered = self.jitter(exp);
        self.balance(jittered)
    }

    /// `min(max, min * growth^attempt)`.
    fn envelope(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nanos = self.min.as_nanos() as f64 * self.growth.powi(exponent);
        if !nanos.is_finite() || nanos >= self.max.as_nanos() as f64 {
            self.max
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }

    fn jitter(&mut self, exp: Duration) -> Duration {
        let exp_nanos = as_nanos(exp);
        if exp_nanos == 0 {
            return Duration::from_nanos(1);
        }

        match self.strategy {
            JitterStrategy::WithoutJitter => exp,
            JitterStrategy::FullJitter => Duration::from_nanos(self.rng.random_range(0..exp_nanos)),
            JitterStrategy::EqualJitter => {
                let half = exp_nanos / 2;
                if half == 0 {
                    return exp;
                }
                Duration::from_nanos(half + self.rng.random_range(0..half))
            }
            JitterStrategy::DecorrelatedJitter => {
                if self.prev.is_zero() {
                    self.prev = self.min;
                }
                let upper = as_nanos(self.prev)
                    .saturating_mul(3)
                    .saturating_sub(as_nanos(self.min));
                let spread = if upper == 0 {
                    0
                } else {
                    self.rng.random_range(0..upper)
                };
                let next = (self.min + Duration::from_nanos(spread)).min(self.max);
                self.prev = next;
                next
            }
        }
    }

    /// Pull the wait back into `[min, max]`.
    fn balance(&self, delay: Duration) -> Duration {
        if delay.is_zero() || delay > self.max {
            self.max
        } else if delay < self.min {
            self.min
        } else {
            delay
        }
    }
}

fn as_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Parse a `Retry-After` header value.
///
/// Accepts delay seconds (`"120"`) or an HTTP-date
/// (`"Fri, 31 Dec 1999 23:59:59 GMT"`). A date in the past yields a zero
/// wait. Negative or malformed values yield `None`.
///
/// ```
/// use bulwark_http::parse_retry_after;
/// use std::time::Duration;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("-5"), None);
/// assert_eq!(parse_retry_after("Fri, 31 Dec 1999 23:59:59 GMT"), Some(Duration::ZERO));
/// ```
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}
