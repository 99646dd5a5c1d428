//! Backoff policies applied between failed connection attempts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Wait inserted between failed attempts when neither the target nor the
/// options name a policy.
pub const DEFAULT_BACKOFF_DELAY: Duration = Duration::from_secs(1);

/// Signature of a caller-supplied policy: `(attempt_index, max_retries) -> wait`.
pub type BackoffFn = dyn Fn(u32, u32) -> Duration + Send + Sync;

/// Maps `(attempt index, maximum retries)` to the wait before the next attempt.
///
/// `attempt` is the 0-based index of the attempt that just failed.
#[derive(Clone)]
pub enum Backoff {
    Constant(Duration),
    /// `step * (attempt + 1)`, capped at `max`.
    Linear { step: Duration, max: Duration },
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
    Custom(Arc<BackoffFn>),
}

impl Backoff {
    /// Wrap a closure as a policy.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32, u32) -> Duration + Send + Sync + 'static,
    {
        Backoff::Custom(Arc::new(f))
    }

    #[must_use]
    pub fn delay(&self, attempt: u32, max_retries: u32) -> Duration {
        match self {
            Backoff::Constant(d) => *d,
            Backoff::Linear { step, max } => {
                step.saturating_mul(attempt.saturating_add(1)).min(*max)
            }
            Backoff::Exponential { base, max } => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(*max)
            }
            Backoff::Custom(f) => f(attempt, max_retries),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Constant(DEFAULT_BACKOFF_DELAY)
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backoff::Constant(d) => f.debug_tuple("Constant").field(d).finish(),
            Backoff::Linear { step, max } => f
                .debug_struct("Linear")
                .field("step", step)
                .field("max", max)
                .finish(),
            Backoff::Exponential { base, max } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max", max)
                .finish(),
            Backoff::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for Backoff {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Backoff::Constant(a), Backoff::Constant(b)) => a == b,
            (
                Backoff::Linear { step: a, max: am },
                Backoff::Linear { step: b, max: bm },
            ) => a == b && am == bm,
            (
                Backoff::Exponential { base: a, max: am },
                Backoff::Exponential { base: b, max: bm },
            ) => a == b && am == bm,
            (Backoff::Custom(a), Backoff::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Backoff {}
