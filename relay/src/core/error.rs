//! Error taxonomy surfaced by the relay engine.
//!
//! Collaborators report failures as `anyhow::Error`; the engine wraps them
//! with the stage and round they belong to. No variant is ever swallowed or
//! retried by the engine.

use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Chain configuration problems, reported before any round executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("chain[{index}]: agent identifier must be non-empty")]
    EmptyAgentId { index: usize },
    #[error("chain[{index}]: middleware identifier must be non-empty when present")]
    EmptyMiddlewareId { index: usize },
    #[error("chain[{index}]: agent {agent:?} already appears at chain[{first}]")]
    DuplicateAgent {
        agent: String,
        index: usize,
        first: usize,
    },
    #[error("unknown agent {0:?} (no capability registered)")]
    UnknownAgent(String),
    #[error("unknown middleware {0:?} (no capability registered)")]
    UnknownMiddleware(String),
    #[error("{field} must be > 0")]
    NonPositive { field: &'static str },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("agent {agent:?} failed in round {round}")]
    AgentInvocation {
        agent: String,
        round: u32,
        #[source]
        source: BoxError,
    },
    #[error("middleware {middleware:?} failed on output of agent {agent:?} in round {round}")]
    Middleware {
        middleware: String,
        agent: String,
        round: u32,
        #[source]
        source: BoxError,
    },
    #[error("evaluator failed after round {round}")]
    Evaluator {
        round: u32,
        #[source]
        source: BoxError,
    },
    #[error("session deadline of {timeout:?} exceeded in round {round}")]
    DeadlineExceeded { round: u32, timeout: Duration },
    #[error("invalid relay configuration")]
    Config(#[from] ConfigError),
    #[error("session already executed; build a new engine for another run")]
    AlreadyExecuted,
}

impl RelayError {
    /// Round in which the session aborted, if the error happened mid-run.
    pub fn round(&self) -> Option<u32> {
        match self {
            RelayError::AgentInvocation { round, .. }
            | RelayError::Middleware { round, .. }
            | RelayError::Evaluator { round, .. }
            | RelayError::DeadlineExceeded { round, .. } => Some(*round),
            RelayError::Config(_) | RelayError::AlreadyExecuted => None,
        }
    }
}
