//! Relay configuration stored in `relay.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::chain::{ChainConfig, StageSpec};
use crate::io::command::CommandSpec;

pub const DEFAULT_CONFIG_PATH: &str = "relay.toml";

/// Relay configuration (TOML).
///
/// Orchestration settings (`max_loops`, `chain`, ...) sit at the top level;
/// capability tables map identifiers to the commands that serve them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayFileConfig {
    #[serde(flatten)]
    pub relay: ChainConfig,

    /// Append session events to this file in addition to tracing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_log: Option<PathBuf>,

    #[serde(default)]
    pub agents: BTreeMap<String, CommandSpec>,

    #[serde(default)]
    pub middleware: BTreeMap<String, CommandSpec>,

    /// Evaluator command. When absent every round answers `continue`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<CommandSpec>,
}

impl RelayFileConfig {
    /// Starter configuration written by `relay init`: one `cat` agent that
    /// echoes its prompt, run for a single round.
    pub fn starter() -> Self {
        let mut agents = BTreeMap::new();
        agents.insert("echo".to_string(), CommandSpec::new(["cat"]));
        Self {
            relay: ChainConfig {
                max_loops: 1,
                ..ChainConfig::new(vec![StageSpec::new("echo")])
            },
            event_log: Some(PathBuf::from("logs/session_log.txt")),
            agents,
            middleware: BTreeMap::new(),
            evaluator: None,
        }
    }

    /// Validate orchestration settings and every command table.
    ///
    /// Whether each chain identifier has a capability is checked when the
    /// registry resolves the chain.
    pub fn validate(&self) -> Result<()> {
        self.relay.validate()?;
        for (id, spec) in &self.agents {
            spec.validate(&format!("agents.{id}"))?;
        }
        for (id, spec) in &self.middleware {
            spec.validate(&format!("middleware.{id}"))?;
        }
        if let Some(spec) = &self.evaluator {
            spec.validate("evaluator")?;
        }
        if let Some(path) = &self.event_log
            && path.as_os_str().is_empty()
        {
            return Err(anyhow!("event_log must be a non-empty path"));
        }
        Ok(())
    }
}

/// Load config from a TOML file. Unlike most settings the chain has no
/// useful default, so a missing file is an error.
pub fn load_config(path: &Path) -> Result<RelayFileConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "missing {} (run `relay init` to create one)",
            path.display()
        ));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RelayFileConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RelayFileConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
