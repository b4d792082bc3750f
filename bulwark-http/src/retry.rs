//! Retry policy and retry condition evaluation.

use crate::backoff::Backoff;
use crate::{HttpClientError, Response};
use http::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_WAIT: Duration = Duration::from_millis(100);

/// User predicate that may force a retry the built-in rules would not make.
pub type RetryCondition =
    Arc<dyn Fn(Option<&Response>, Option<&HttpClientError>) -> bool + Send + Sync>;

/// What to do when the final permitted attempt still looks retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Fail with [`HttpClientError::RetryExhausted`].
    #[default]
    Fail,
    /// Hand back the final response or error unchanged.
    ReturnLastOutcome,
}

/// Retry configuration.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Static wait between attempts, used when `backoff` is `None`.
    pub wait: Duration,
    /// Backoff calculator.
    pub backoff: Option<Backoff>,
    /// Extra retry predicate.
    pub condition: Option<RetryCondition>,
    /// Whether POST, PATCH and CONNECT may be retried.
    pub allow_non_idempotent: bool,
    /// Behaviour once attempts run out.
    pub exhaustion: ExhaustionPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait: DEFAULT_WAIT,
            backoff: Some(Backoff::default()),
            condition: None,
            allow_non_idempotent: false,
            exhaustion: ExhaustionPolicy::default(),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("wait", &self.wait)
            .field("backoff", &self.backoff)
            .field("condition", &self.condition.is_some())
            .field("allow_non_idempotent", &self.allow_non_idempotent)
            .field("exhaustion", &self.exhaustion)
            .finish()
    }
}

impl RetryPolicy {
    /// Create a policy with the default jittered backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Create a policy with a constant wait between attempts.
    pub fn constant(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            wait,
            backoff: None,
            ..Default::default()
        }
    }

    /// Create a policy with the given backoff calculator.
    pub fn with_backoff_strategy(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Some(backoff),
            ..Default::default()
        }
    }

    /// Create a policy that retries without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::constant(max_attempts, Duration::ZERO)
    }

    /// Set the retry predicate.
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(Option<&Response>, Option<&HttpClientError>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Allow retrying non-idempotent methods.
    pub fn allow_non_idempotent(mut self, allow: bool) -> Self {
        self.allow_non_idempotent = allow;
        self
    }

    /// Set the exhaustion behaviour.
    pub fn with_exhaustion(mut self, exhaustion: ExhaustionPolicy) -> Self {
        self.exhaustion = exhaustion;
        self
    }

    /// Check if requests with this method go through the retry loop.
    pub fn applies_to(&self, method: &Method) -> bool {
        self.allow_non_idempotent || is_idempotent(method)
    }

    /// Decide whether the outcome of `attempt` should be retried.
    pub fn should_retry(
        &self,
        response: Option<&Response>,
        error: Option<&HttpClientError>,
        idempotent: bool,
        attempt: u32,
    ) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        self.is_retryable(response, error, idempotent)
    }

    /// Classify an outcome, ignoring the attempt limit.
    pub fn is_retryable(
        &self,
        response: Option<&Response>,
        error: Option<&HttpClientError>,
        idempotent: bool,
    ) -> bool {
        if !idempotent && !self.allow_non_idempotent {
            return false;
        }

        match builtin_verdict(response, error) {
            Verdict::Retry => true,
            Verdict::Never => false,
            Verdict::Stop => self
                .condition
                .as_ref()
                .is_some_and(|condition| condition(response, error)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Retry,
    /// Not retryable by the built-in rules; the user predicate may override.
    Stop,
    /// Never retryable.
    Never,
}

fn builtin_verdict(response: Option<&Response>, error: Option<&HttpClientError>) -> Verdict {
    if let Some(error) = error {
        return match error {
            HttpClientError::Transport(e) if e.is_permanent() => Verdict::Never,
            HttpClientError::Transport(e) if e.is_temporary() => Verdict::Retry,
            HttpClientError::Transport(_) => Verdict::Stop,
            _ => Verdict::Never,
        };
    }

    match response {
        Some(response) if status_is_retryable(response.status().as_u16()) => Verdict::Retry,
        _ => Verdict::Stop,
    }
}

/// The built-in retry rules, without idempotency or attempt limits.
pub fn default_retry_condition(
    response: Option<&Response>,
    error: Option<&HttpClientError>,
) -> bool {
    builtin_verdict(response, error) == Verdict::Retry
}

/// 429, every 5xx except 501, and a missing (zero) status are retryable.
pub fn status_is_retryable(status: u16) -> bool {
    status == 0 || status == 429 || (status >= 500 && status != 501)
}

/// Methods whose repeated application has the effect of applying them once.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::PUT | Method::DELETE
    )
}
