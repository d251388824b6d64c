//! Requeue signals returned by reconciliation steps
//!
//! A step returns `None` when its resource is converged. Otherwise it returns
//! a [`Requeue`] telling the caller why another pass is needed and how soon.

use std::fmt;
use std::time::Duration;

use crate::Error;

/// Result of one reconciliation step: `None` means converged
pub type StepOutcome = Option<Requeue>;

/// Instruction to re-run the reconciliation pass
#[derive(Debug)]
pub struct Requeue {
    /// Short human-readable reason, logged by the controller
    pub reason: String,
    /// Suggested delay before the next pass
    pub delay: Option<Duration>,
    /// Failure behind this signal; `None` for expected races
    pub error: Option<Error>,
    /// The pass cannot succeed without an outside change
    pub terminal: bool,
}

impl Requeue {
    /// Deliberate re-check after `delay`, not a failure (e.g. a write conflict)
    pub fn after(reason: impl Into<String>, delay: Duration) -> Self {
        Self {
            reason: reason.into(),
            delay: Some(delay),
            error: None,
            terminal: false,
        }
    }

    /// Failure the caller should retry with backoff
    pub fn error(reason: impl Into<String>, error: Error, delay: Duration) -> Self {
        Self {
            reason: reason.into(),
            delay: Some(delay),
            error: Some(error),
            terminal: false,
        }
    }

    /// Failure that will not clear until the resource or the operator changes
    pub fn terminal(reason: impl Into<String>, error: Error) -> Self {
        Self {
            reason: reason.into(),
            delay: None,
            error: Some(error),
            terminal: true,
        }
    }

    /// True if this signal carries an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for Requeue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(error) = &self.error {
            write!(f, ": {error}")?;
        }
        if let Some(delay) = self.delay {
            write!(f, " (retry in {}ms)", delay.as_millis())?;
        }
        Ok(())
    }
}

/// Exponential backoff across consecutive failed passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound on any delay
    pub max: Duration,
}

impl Backoff {
    /// Delay after `failures` previous consecutive failures: `base * 2^failures`,
    /// capped at `max`
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures);
        self.base.saturating_mul(factor).min(self.max)
    }
}
