//! Chain configuration and history labels.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::types::RoundSeed;

/// History label for the initial user input.
pub const USER_INPUT_LABEL: &str = "user_input";

pub const DEFAULT_MAX_LOOPS: u32 = 5;
pub const DEFAULT_PACING_MS: u64 = 250;

/// One configured pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middleware: Option<String>,
}

impl StageSpec {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            middleware: None,
        }
    }

    pub fn with_middleware(mut self, middleware: impl Into<String>) -> Self {
        self.middleware = Some(middleware.into());
        self
    }
}

/// Orchestration settings for one relay session.
///
/// `chain` is required when parsed; every other field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Hard cap on the number of rounds.
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,

    #[serde(default)]
    pub round_seed: RoundSeed,

    /// Delay between rounds. Never applied after the final round.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Optional wall-clock budget for the whole session, checked between stage calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout_secs: Option<u64>,

    pub chain: Vec<StageSpec>,
}

fn default_max_loops() -> u32 {
    DEFAULT_MAX_LOOPS
}

fn default_pacing_ms() -> u64 {
    DEFAULT_PACING_MS
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_loops: DEFAULT_MAX_LOOPS,
            round_seed: RoundSeed::default(),
            pacing_ms: DEFAULT_PACING_MS,
            session_timeout_secs: None,
            chain: Vec::new(),
        }
    }
}

impl ChainConfig {
    pub fn new(chain: Vec<StageSpec>) -> Self {
        Self {
            chain,
            ..Self::default()
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_secs.map(Duration::from_secs)
    }

    /// Check identifiers and limits. Capability lookup happens separately,
    /// in the registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_timeout_secs == Some(0) {
            return Err(ConfigError::NonPositive {
                field: "session_timeout_secs",
            });
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (index, stage) in self.chain.iter().enumerate() {
            if stage.agent.trim().is_empty() {
                return Err(ConfigError::EmptyAgentId { index });
            }
            if let Some(middleware) = &stage.middleware
                && middleware.trim().is_empty()
            {
                return Err(ConfigError::EmptyMiddlewareId { index });
            }
            if let Some(&first) = seen.get(stage.agent.as_str()) {
                return Err(ConfigError::DuplicateAgent {
                    agent: stage.agent.clone(),
                    index,
                    first,
                });
            }
            seen.insert(stage.agent.as_str(), index);
        }
        Ok(())
    }
}

/// History label for `agent`'s output in `round`.
///
/// The round is the digit run after the final `_output_`, so distinct
/// `(agent, round)` pairs never share a label.
pub fn output_label(agent: &str, round: u32) -> String {
    format!("{agent}_output_{round}")
}
