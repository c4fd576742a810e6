//! Subprocess adapters for agents, middleware and evaluators.
//!
//! Each configured command receives its text on stdin and answers on stdout.
//! Environment variables tell a shared script which identifier it is serving:
//! `RELAY_AGENT`, `RELAY_MIDDLEWARE`, and `RELAY_ROUND` for evaluators.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::capability::{Agent, Evaluator, Middleware};
use crate::core::history::HistoryStore;
use crate::core::types::Verdict;
use crate::io::process::{CommandOutput, run_command_with_timeout};

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;
const STDERR_EXCERPT_CHARS: usize = 2_000;

/// How to launch an external capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program followed by its arguments (e.g. `["codex", "exec", "-"]`).
    pub command: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bytes of stdout kept; output beyond this is an error, not a silent cut.
    #[serde(default = "default_output_limit_bytes")]
    pub output_limit_bytes: usize,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_output_limit_bytes() -> usize {
    DEFAULT_OUTPUT_LIMIT_BYTES
}

impl CommandSpec {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            bail!("{name}.command must be a non-empty array");
        }
        if self.timeout_secs == 0 {
            bail!("{name}.timeout_secs must be > 0");
        }
        if self.output_limit_bytes == 0 {
            bail!("{name}.output_limit_bytes must be > 0");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn program(&self) -> Result<Command> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }

    /// Run with `input` on stdin and return trimmed stdout, failing on
    /// spawn errors, timeouts, non-zero exits and truncated output.
    fn run(&self, cmd: Command, input: &str) -> Result<String> {
        let output = run_command_with_timeout(
            cmd,
            Some(input.as_bytes()),
            self.timeout(),
            self.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.command.join(" ")))?;
        self.check(&output)?;
        output.stdout_text()
    }

    fn check(&self, output: &CommandOutput) -> Result<()> {
        let shown = self.command.join(" ");
        if output.timed_out {
            warn!(command = %shown, timeout_secs = self.timeout_secs, "command timed out");
            return Err(anyhow!("{shown} timed out after {:?}", self.timeout()));
        }
        if !output.status.success() {
            warn!(command = %shown, exit_code = ?output.status.code(), "command failed");
            return Err(anyhow!(
                "{shown} failed with status {:?}: {}",
                output.status.code(),
                output.stderr_excerpt(STDERR_EXCERPT_CHARS)
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "{shown} produced {} bytes beyond the {} byte output limit",
                output.stdout_truncated,
                self.output_limit_bytes
            ));
        }
        Ok(())
    }
}

/// An agent or middleware backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandCapability {
    spec: CommandSpec,
}

impl CommandCapability {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl Agent for CommandCapability {
    #[instrument(skip_all, fields(agent = agent_id, prompt_bytes = prompt.len()))]
    fn invoke(&self, agent_id: &str, prompt: &str) -> Result<String> {
        let mut cmd = self.spec.program()?;
        cmd.env("RELAY_AGENT", agent_id);
        let output = self.spec.run(cmd, prompt)?;
        debug!(output_bytes = output.len(), "agent command finished");
        Ok(output)
    }
}

impl Middleware for CommandCapability {
    #[instrument(skip_all, fields(middleware = middleware_id, input_bytes = text.len()))]
    fn transform(&self, middleware_id: &str, text: &str) -> Result<String> {
        let mut cmd = self.spec.program()?;
        cmd.env("RELAY_MIDDLEWARE", middleware_id);
        let output = self.spec.run(cmd, text)?;
        debug!(output_bytes = output.len(), "middleware command finished");
        Ok(output)
    }
}

/// Evaluator backed by an external command.
///
/// The command reads the history summary on stdin and prints `continue` or
/// `terminate`. Anything else is an error, never a default.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    spec: CommandSpec,
}

impl CommandEvaluator {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl Evaluator for CommandEvaluator {
    #[instrument(skip_all, fields(round = round))]
    fn evaluate(&self, history: &HistoryStore, round: u32) -> Result<Verdict> {
        let mut cmd = self.spec.program()?;
        cmd.env("RELAY_ROUND", round.to_string());
        let answer = self.spec.run(cmd, &history.summarize_history())?;
        let verdict = answer
            .parse::<Verdict>()
            .context("parse evaluator verdict")?;
        debug!(%verdict, "evaluator command answered");
        Ok(verdict)
    }
}
