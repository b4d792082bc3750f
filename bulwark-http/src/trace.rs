//! Request trace information.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Timing of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptTrace {
    /// 1-indexed attempt number.
    pub attempt: u32,
    /// Time from sending the request to receiving the response head.
    pub server_time: Duration,
    /// Response status, when one was received.
    pub status: Option<u16>,
    /// Error message, when the attempt failed.
    pub error: Option<String>,
    /// Wait scheduled after this attempt.
    pub wait: Duration,
}

/// Trace of a request across all of its attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceInfo {
    /// Per-attempt timings, in order.
    pub attempts: Vec<AttemptTrace>,
    /// End-to-end duration, waits included.
    pub total_time: Duration,
    /// Time spent sleeping between attempts.
    pub total_wait: Duration,
}

impl TraceInfo {
    /// Number of attempts made.
    pub fn request_attempts(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }

    /// Server time of the final attempt.
    pub fn server_time(&self) -> Duration {
        self.attempts
            .last()
            .map(|a| a.server_time)
            .unwrap_or_default()
    }

    pub(crate) fn record(&mut self, attempt: AttemptTrace) {
        self.attempts.push(attempt);
    }

    pub(crate) fn set_last_wait(&mut self, wait: Duration) {
        if let Some(last) = self.attempts.last_mut() {
            last.wait = wait;
        }
    }
}

impl fmt::Display for TraceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TRACE INFO:")?;
        writeln!(f, "  Attempts   : {}", self.request_attempts())?;
        writeln!(f, "  ServerTime : {:?}", self.server_time())?;
        writeln!(f, "  TotalWait  : {:?}", self.total_wait)?;
        write!(f, "  TotalTime  : {:?}", self.total_time)?;
        for a in &self.attempts {
            write!(f, "\n  #{} {:?}", a.attempt, a.server_time)?;
            match (&a.status, &a.error) {
                (Some(status), _) => write!(f, " status={status}")?,
                (None, Some(error)) => write!(f, " error={error}")?,
                (None, None) => {}
            }
            if !a.wait.is_zero() {
                write!(f, " wait={:?}", a.wait)?;
            }
        }
        Ok(())
    }
}
