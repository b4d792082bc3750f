//! Circuit breaker pattern implementation.
//!
//! ```text
//! Closed   --failure_threshold consecutive failures-->  Open
//! Open     --probe after reset_timeout------------->  HalfOpen
//! HalfOpen --any failure--------------------------->  Open (fresh trip time)
//! HalfOpen --success_threshold successes----------->  Closed
//! ```

use crate::{HttpClientError, Response, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_SUCCESS_THRESHOLD: u32 = 1;
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(2);

/// Decides whether a response counts as a breaker failure.
pub type TripPredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, probe requests are allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures to open the circuit.
    pub failure_threshold: u32,
    /// Number of half-open successes needed to close the circuit.
    pub success_threshold: u32,
    /// Time to stay open before letting a probe through.
    pub reset_timeout: Duration,
    /// Predicate marking a response as a failure.
    pub trip: TripPredicate,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            trip: Arc::new(default_trip),
        }
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker config.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            ..Default::default()
        }
    }

    /// Set the success threshold to close the circuit.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the predicate that marks a response as a failure.
    pub fn with_trip_predicate<F>(mut self, trip: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.trip = Arc::new(trip);
        self
    }

    fn normalized(mut self) -> Self {
        if self.failure_threshold == 0 {
            self.failure_threshold = DEFAULT_FAILURE_THRESHOLD;
        }
        if self.success_threshold == 0 {
            self.success_threshold = DEFAULT_SUCCESS_THRESHOLD;
        }
        if self.reset_timeout.is_zero() {
            self.reset_timeout = DEFAULT_RESET_TIMEOUT;
        }
        self
    }
}

/// Server errors trip the breaker.
fn default_trip(response: &Response) -> bool {
    response.status().as_u16() > 499
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

impl BreakerState {
    fn trip(&mut self) {
        if self.state != CircuitState::Open {
            warn!(previous = %self.state, "Circuit breaker opening");
        }
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.failures = 0;
        self.successes = 0;
    }

    fn close(&mut self) {
        info!("Circuit breaker closing");
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.failures = 0;
        self.successes = 0;
    }
}

/// Circuit breaker shared by every request of a client.
///
/// State and counters sit behind one lock so a state is never observed
/// together with counters from another epoch.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: config.normalized(),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Get the breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Gate a request before it is attempted.
    ///
    /// Fails with [`HttpClientError::BreakerOpen`] while the circuit is open.
    /// Once the reset timeout has elapsed the circuit moves to half-open and
    /// the caller may proceed; concurrent callers may all pass as probes.
    /// A half-open attempt abandoned before it produces an outcome records
    /// nothing, and the circuit stays half-open until a later attempt reports
    /// one.
    pub fn pre_request(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let ready = inner
            .opened_at
            .is_none_or(|opened| opened.elapsed() >= self.config.reset_timeout);
        if !ready {
            return Err(HttpClientError::BreakerOpen);
        }

        debug!("Circuit breaker transitioning to half-open");
        inner.state = CircuitState::HalfOpen;
        inner.failures = 0;
        inner.successes = 0;
        Ok(())
    }

    /// Record a successful request.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures = 0;
                inner.successes = inner.successes.saturating_add(1);
            }
            CircuitState::HalfOpen => {
                inner.failures = 0;
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.close();
                }
            }
            CircuitState::Open => {
                // A request admitted before the trip finished late.
            }
        }
    }

    /// Record a failed request.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.successes = 0;
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.trip();
                }
            }
            CircuitState::HalfOpen => inner.trip(),
            CircuitState::Open => {}
        }
    }

    /// Record the outcome of an attempt.
    ///
    /// An error, or a response matching the trip predicate, is a failure.
    pub fn execute(&self, response: Option<&Response>, error: Option<&HttpClientError>) {
        let failed = error.is_some() || response.is_some_and(|r| (self.config.trip)(r));
        if failed {
            self.on_failure();
        } else {
            self.on_success();
        }
    }

    /// Get the consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    /// Get the success count for the current epoch.
    pub fn success_count(&self) -> u32 {
        self.inner.lock().successes
    }

    /// When the circuit last tripped open.
    pub fn opened_at(&self) -> Option<Instant> {
        self.inner.lock().opened_at
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        self.inner.lock().close();
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &*self.inner.lock())
            .finish()
    }
}
