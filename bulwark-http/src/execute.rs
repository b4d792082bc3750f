//! Request execution: circuit breaking, retries, backoff and decompression.

use crate::backoff::Backoff;
use crate::body::RequestBody;
use crate::context::ExecContext;
use crate::retry::{ExhaustionPolicy, RetryPolicy, is_idempotent};
use crate::trace::{AttemptTrace, TraceInfo};
use crate::{HttpClient, HttpClientError, Response, Result, RetryExhausted};
use http::header::{CONTENT_LENGTH, HeaderValue};
use http::{HeaderMap, Method};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Bytes read from a discarded response before its body is closed.
const DRAIN_LIMIT: usize = 2048;

/// A request in the form it is rebuilt from on every attempt.
#[derive(Debug)]
pub(crate) struct PreparedRequest {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: RequestBody,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) ctx: ExecContext,
    pub(crate) trace: bool,
}

impl PreparedRequest {
    /// Build the transport request for the given 1-indexed attempt.
    fn build(&mut self, attempt: u32) -> Result<reqwest::Request> {
        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        *request.timeout_mut() = self.timeout;

        if let Some(body) = self.body.for_attempt(attempt)? {
            if let Some(len) = self.body.size_hint()
                && !request.headers().contains_key(CONTENT_LENGTH)
            {
                request
                    .headers_mut()
                    .insert(CONTENT_LENGTH, HeaderValue::from(len));
            }
            *request.body_mut() = Some(body);
        }

        Ok(request)
    }
}

/// Progress of one request across its attempts.
struct Run {
    started: Instant,
    attempt: u32,
    total_wait: Duration,
    trace: Option<TraceInfo>,
}

impl HttpClient {
    /// Execute a prepared request.
    ///
    /// Without a retry policy, or for a non-idempotent method that has not
    /// opted in, the request is attempted once and its outcome returned as
    /// is. Otherwise failed attempts are retried until the policy says stop
    /// or the attempt limit is reached.
    pub(crate) async fn execute(&self, mut prepared: PreparedRequest) -> Result<Response> {
        let policy = prepared
            .retry
            .take()
            .filter(|p| p.applies_to(&prepared.method));
        let idempotent = is_idempotent(&prepared.method);
        let max_attempts = policy.as_ref().map_or(1, |p| p.max_attempts.max(1));
        let mut backoff = policy
            .as_ref()
            .and_then(|p| p.backoff.as_ref())
            .map(Backoff::fresh);

        let mut run = Run {
            started: Instant::now(),
            attempt: 0,
            total_wait: Duration::ZERO,
            trace: prepared.trace.then(TraceInfo::default),
        };

        loop {
            run.attempt += 1;
            let outcome = self.attempt(&mut prepared, &mut run).await;

            let Some(policy) = &policy else {
                return self.finish(outcome, &mut run).await;
            };
            let retryable =
                policy.is_retryable(outcome.as_ref().ok(), outcome.as_ref().err(), idempotent);

            if run.attempt >= max_attempts {
                if retryable && policy.exhaustion == ExhaustionPolicy::Fail {
                    debug!(
                        method = %prepared.method,
                        url = %prepared.url,
                        attempts = run.attempt,
                        "Retry attempts exhausted"
                    );
                    return Err(exhausted(&prepared, &run, outcome));
                }
                return self.finish(outcome, &mut run).await;
            }

            if !retryable {
                return self.finish(outcome, &mut run).await;
            }

            let wait = match backoff.as_mut() {
                Some(backoff) => backoff.next_wait(outcome.as_ref().ok(), run.attempt),
                None => policy.wait,
            };

            match &outcome {
                Ok(response) => debug!(
                    attempt = run.attempt,
                    status = %response.status(),
                    wait = ?wait,
                    "Retrying request due to status code"
                ),
                Err(e) => debug!(
                    attempt = run.attempt,
                    error = %e,
                    wait = ?wait,
                    "Retrying request due to error"
                ),
            }

            if let Ok(mut response) = outcome {
                prepared.ctx.run(response.drain(DRAIN_LIMIT)).await?;
            }
            prepared.ctx.sleep(wait).await?;

            run.total_wait += wait;
            if let Some(trace) = run.trace.as_mut() {
                trace.set_last_wait(wait);
            }
        }
    }

    /// One attempt: breaker gate, request rebuild, transport call and
    /// decompression.
    async fn attempt(&self, prepared: &mut PreparedRequest, run: &mut Run) -> Result<Response> {
        if let Some(breaker) = &self.circuit_breaker {
            breaker.pre_request()?;
        }

        let mut request = prepared.build(run.attempt)?;
        for interceptor in self.interceptors.iter() {
            request = interceptor.intercept_request(request).await?;
        }

        let sent = Instant::now();
        let result = prepared.ctx.run(self.transport.execute(request)).await?;
        let server_time = sent.elapsed();

        let outcome = match result {
            Ok(raw) => Ok(Response::from(raw).with_codecs(self.codecs.clone())),
            Err(_) if prepared.ctx.deadline_passed() => {
                return Err(HttpClientError::DeadlineExceeded);
            }
            Err(e) => Err(HttpClientError::Transport(e)),
        };

        if let Some(breaker) = &self.circuit_breaker {
            breaker.execute(outcome.as_ref().ok(), outcome.as_ref().err());
        }

        if let Some(trace) = run.trace.as_mut() {
            trace.record(AttemptTrace {
                attempt: run.attempt,
                server_time,
                status: outcome.as_ref().ok().map(|r| r.status().as_u16()),
                error: outcome.as_ref().err().map(ToString::to_string),
                wait: Duration::ZERO,
            });
        }

        let mut response = outcome?;
        response.decompress(&self.decompressors)?;
        Ok(response)
    }

    /// Attach the attempt statistics to the final outcome and hand it to the
    /// response interceptors.
    async fn finish(&self, outcome: Result<Response>, run: &mut Run) -> Result<Response> {
        let mut response = outcome?;

        let elapsed = run.started.elapsed();
        response.set_outcome(run.attempt, elapsed, run.total_wait);
        if let Some(mut trace) = run.trace.take() {
            trace.total_time = elapsed;
            trace.total_wait = run.total_wait;
            response.set_trace(trace);
        }

        for interceptor in self.interceptors.iter() {
            response = interceptor.intercept_response(response).await?;
        }
        Ok(response)
    }
}

fn exhausted(prepared: &PreparedRequest, run: &Run, outcome: Result<Response>) -> HttpClientError {
    let last_error = match outcome {
        Ok(response) => HttpClientError::Status {
            status: response.status().as_u16(),
            message: response
                .status()
                .canonical_reason()
                .unwrap_or("Unknown status")
                .to_string(),
        },
        Err(e) => e,
    };

    RetryExhausted {
        attempts: run.attempt,
        total_wait: run.total_wait,
        method: prepared.method.clone(),
        url: prepared.url.clone(),
        last_error: Some(Box::new(last_error)),
    }
    .into()
}
