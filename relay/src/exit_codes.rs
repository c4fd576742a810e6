//! Process exit codes for `relay` and the mapping from errors onto them.

use crate::core::error::RelayError;

/// Command succeeded; for `relay run` the session ended normally.
pub const OK: i32 = 0;
/// Bad config, usage or filesystem state; no session ran to a failure.
pub const INVALID: i32 = 1;
/// `relay run` aborted mid-session: a collaborator failed or the deadline passed.
pub const FAILED: i32 = 2;

/// Exit code for an error bubbled up to `main`.
///
/// Only a [`RelayError`] raised while rounds were executing maps to
/// [`FAILED`]; construction-time config errors and everything outside the
/// engine map to [`INVALID`].
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RelayError>() {
        Some(RelayError::Config(_) | RelayError::AlreadyExecuted) | None => INVALID,
        Some(
            RelayError::AgentInvocation { .. }
            | RelayError::Middleware { .. }
            | RelayError::Evaluator { .. }
            | RelayError::DeadlineExceeded { .. },
        ) => FAILED,
    }
}
