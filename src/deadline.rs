//! Hard deadlines derived once at loop entry.

use std::time::Duration;

use tokio::time::Instant;

/// Stand-in for "no practical limit" when a budget overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Returns `start + budget`, clamped to a far-future instant on overflow.
pub(crate) fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}
