//! Retry policy and the exchange state machine.
//!
//! Only server result codes pass through here. Transport failures are a
//! different animal: the connection is suspect, so they surface
//! immediately and reconnecting is the caller's decision.

use crate::error::ResultCode;

/// Default number of attempts per exchange.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Governs which result codes an exchange retries and how many whole
/// write+read cycles run before the error surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    retryable: Vec<ResultCode>,
}

impl RetryPolicy {
    /// Default policy: three attempts, retrying only the cluster-key
    /// mismatch a migrating cluster answers with.
    pub fn new() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            retryable: vec![ResultCode::CLUSTER_KEY_MISMATCH],
        }
    }

    /// Policy for incr/append/prepend/touch. Those create the record they
    /// target when it is missing, so a transient not-found during cluster
    /// reconfiguration is also worth retrying.
    pub fn modify() -> Self {
        Self::new().with_retry_on(ResultCode::KEY_NOT_FOUND)
    }

    /// Replaces the attempt budget; clamped to at least one.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Adds a result code to the retryable set.
    pub fn with_retry_on(mut self, code: ResultCode) -> Self {
        if !self.retryable.contains(&code) {
            self.retryable.push(code);
        }
        self
    }

    /// Clears the retryable set; the first error surfaces immediately.
    pub fn without_retries(mut self) -> Self {
        self.retryable.clear();
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_retryable(&self, code: ResultCode) -> bool {
        self.retryable.contains(&code)
    }

    /// Opens an exchange in its initial state.
    pub fn begin(&self) -> ExchangeState {
        ExchangeState::Attempting {
            remaining: self.attempts,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress of one logical exchange through its retry budget.
///
/// `Attempting` means run one write+read cycle and feed the observed
/// result code to [`ExchangeState::observe`]. The other two states are
/// terminal and absorb further observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Attempting { remaining: u32 },
    Succeeded,
    Failed(ResultCode),
}

impl ExchangeState {
    /// Transitions on the result code of one request/response cycle.
    pub fn observe(self, code: ResultCode, policy: &RetryPolicy) -> ExchangeState {
        match self {
            ExchangeState::Attempting { remaining } => {
                if code.is_ok() {
                    ExchangeState::Succeeded
                } else if remaining > 1 && policy.is_retryable(code) {
                    ExchangeState::Attempting {
                        remaining: remaining - 1,
                    }
                } else {
                    ExchangeState::Failed(code)
                }
            }
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExchangeState::Attempting { .. })
    }
}
