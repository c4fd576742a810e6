//! Session deadline helpers.

use std::time::{Duration, Instant};

/// Deadline for a session started at `start`, if a timeout is configured.
pub fn deadline_from(start: Instant, timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|timeout| start.checked_add(timeout))
}

/// Whether `deadline` has passed. A missing deadline never expires.
pub fn is_expired(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|deadline| now >= deadline)
}
