use std::time::Duration;

/// What went wrong with a probe or segment attempt, as far as retrying goes.
///
/// `classify` maps curl errors, HTTP statuses and transfer checks onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or low-speed timeout.
    Timeout,
    /// 429 / 503: the server wants fewer or slower requests.
    Throttled,
    /// Reset, refused, DNS, or a body cut short.
    Connection,
    /// Any other 5xx.
    Http5xx(u16),
    /// Range mismatch, 4xx, local storage errors. Never retried.
    Other,
}

impl ErrorKind {
    /// Worth another attempt once the backoff has passed.
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The segment (or probe) fails for good.
    NoRetry,
    /// Requeue after this delay.
    RetryAfter(Duration),
}

/// Per-segment attempt budget with exponential backoff between attempts.
///
/// The budget counts the first attempt, so `max_attempts = 1` disables
/// retries. Built from the `[retry]` config section via
/// `SdmConfig::retry_policy`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Cap for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Wait before attempt `failed + 1`: the base delay doubled per earlier
    /// failure, capped at `max_delay`.
    pub fn backoff(&self, failed: u32) -> Duration {
        let doublings = failed.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }

    /// What to do after attempt number `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || !kind.is_transient() {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(attempt))
    }
}
