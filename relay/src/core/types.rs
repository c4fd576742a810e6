//! Shared deterministic types for relay core logic.
//!
//! These types define stable contracts between the engine and its
//! collaborators. They must not depend on external state or I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Evaluator decision taken after every round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Continue,
    Terminate,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Continue => "continue",
            Verdict::Terminate => "terminate",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when evaluator text is neither `continue` nor `terminate`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized verdict {0:?} (expected \"continue\" or \"terminate\")")]
pub struct ParseVerdictError(pub String);

impl FromStr for Verdict {
    type Err = ParseVerdictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("continue") {
            Ok(Verdict::Continue)
        } else if trimmed.eq_ignore_ascii_case("terminate") {
            Ok(Verdict::Terminate)
        } else {
            Err(ParseVerdictError(trimmed.to_string()))
        }
    }
}

/// What the first stage of round `n + 1` receives as its prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundSeed {
    /// The last output recorded in round `n`.
    #[default]
    CarryForward,
    /// The original user input, every round.
    OriginalInput,
}

/// Lifecycle of a single relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Initialized,
    Running,
    /// Between rounds, after a `continue` verdict with budget left.
    Continuing,
    TerminatedByEvaluator,
    Exhausted,
    /// A collaborator failed or the deadline passed; the session is over.
    Failed,
}

impl RelayState {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayState::Initialized => "initialized",
            RelayState::Running => "running",
            RelayState::Continuing => "continuing",
            RelayState::TerminatedByEvaluator => "terminated_by_evaluator",
            RelayState::Exhausted => "exhausted",
            RelayState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RelayState::TerminatedByEvaluator | RelayState::Exhausted | RelayState::Failed
        )
    }
}

/// Reason why `execute_chain` stopped without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStop {
    /// The evaluator returned `terminate` after `round` (0-based).
    TerminatedByEvaluator { round: u32 },
    /// All `max_loops` rounds ran without a `terminate` verdict.
    Exhausted { max_loops: u32 },
}

/// Summary of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub session_id: String,
    /// Latest recorded value: the final stage output, or the user input when
    /// no stage ever ran.
    pub result: String,
    pub rounds_executed: u32,
    pub stop: RelayStop,
}
