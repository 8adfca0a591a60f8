//! Bounded retry around compare-and-swap commits

use crate::errors::{LedgerError, LedgerResult};

/// Run `attempt` until it produces a value or the attempt budget is spent.
///
/// `attempt` re-reads whatever it conditions on and returns `Ok(None)` when its
/// commit lost a version race. Any error ends the loop immediately.
pub fn retry_on_conflict<T, F>(max_attempts: u32, mut attempt: F) -> LedgerResult<T>
where
    F: FnMut(u32) -> LedgerResult<Option<T>>,
{
    let max_attempts = max_attempts.max(1);
    for n in 1..=max_attempts {
        if let Some(value) = attempt(n)? {
            return Ok(value);
        }
        tracing::debug!(attempt = n, max_attempts, "Commit conflict, retrying");
    }
    tracing::warn!(max_attempts, "Giving up after repeated commit conflicts");
    Err(LedgerError::ConcurrencyConflict {
        attempts: max_attempts,
    })
}
