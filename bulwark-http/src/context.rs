//! Cancellation and deadline handling for one request.

use crate::{HttpClientError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token and deadline shared by every attempt of a request.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExecContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecContext {
    pub(crate) fn new(token: Option<CancellationToken>, deadline: Option<Instant>) -> Self {
        Self {
            token: token.unwrap_or_default(),
            deadline,
        }
    }

    pub(crate) fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Drive `fut` unless the token fires or the deadline passes first.
    ///
    /// The losing branches are dropped, so no timer outlives the call.
    pub(crate) async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        if self.token.is_cancelled() {
            return Err(HttpClientError::Cancelled);
        }
        if self.deadline_passed() {
            return Err(HttpClientError::DeadlineExceeded);
        }

        let deadline = self.deadline.unwrap_or_else(Instant::now);
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(HttpClientError::Cancelled),
            _ = tokio::time::sleep_until(deadline), if self.deadline.is_some() => {
                Err(HttpClientError::DeadlineExceeded)
            }
            output = fut => Ok(output),
        }
    }

    pub(crate) async fn sleep(&self, wait: Duration) -> Result<()> {
        self.run(tokio::time::sleep(wait)).await
    }
}
