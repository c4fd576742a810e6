//! Wiring for `relay run`: config file → capabilities → engine → outcome.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::capability::{AlwaysContinue, Evaluator};
use crate::core::types::RelayOutcome;
use crate::io::command::CommandEvaluator;
use crate::io::config::RelayFileConfig;
use crate::io::event_log::{EventSink, FanoutSink, FileEventLog, TracingSink};
use crate::io::snapshot::{HistorySnapshot, write_snapshot};
use crate::registry::CapabilityRegistry;
use crate::relay::RelayEngine;

/// Options for a single `relay run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions<'a> {
    /// Write a JSON history snapshot here, whether the run succeeds or not.
    pub history_out: Option<&'a Path>,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RelayOutcome,
    /// `summarize_history()` of the finished session.
    pub summary: String,
}

/// Build an engine from a loaded config: command capabilities, the
/// configured evaluator (or always-continue) and the event sinks.
pub fn build_engine(cfg: &RelayFileConfig) -> Result<RelayEngine> {
    let registry = CapabilityRegistry::from_file_config(cfg);
    let evaluator: Arc<dyn Evaluator> = match &cfg.evaluator {
        Some(spec) => Arc::new(CommandEvaluator::new(spec.clone())),
        None => Arc::new(AlwaysContinue),
    };
    let sink = build_sink(cfg)?;
    let engine = RelayEngine::with_shared(cfg.relay.clone(), &registry, evaluator, sink)
        .context("build relay engine")?;
    Ok(engine)
}

fn build_sink(cfg: &RelayFileConfig) -> Result<Arc<dyn EventSink>> {
    let mut sink = FanoutSink::new().with(TracingSink);
    if let Some(path) = &cfg.event_log {
        sink = sink.with(FileEventLog::create(path)?);
    }
    Ok(Arc::new(sink))
}

/// Run the configured chain once on `input`.
#[instrument(skip_all, fields(input_bytes = input.len()))]
pub fn run_with_config(
    cfg: &RelayFileConfig,
    input: &str,
    options: &RunOptions<'_>,
) -> Result<RunReport> {
    let mut engine = build_engine(cfg)?;
    let result = engine.execute_chain(input);

    if let Some(path) = options.history_out {
        debug!(path = %path.display(), "writing history snapshot");
        write_snapshot(
            path,
            &HistorySnapshot {
                session_id: engine.session_id().to_string(),
                round: engine.round(),
                state: engine.state().as_str().to_string(),
                history: engine.history().clone(),
            },
        )?;
    }

    let outcome = result.context("relay session failed")?;
    Ok(RunReport {
        outcome,
        summary: engine.history().summarize_history(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::chain::{ChainConfig, StageSpec};
    use crate::core::error::RelayError;
    use crate::core::types::RelayStop;
    use crate::io::command::CommandSpec;
    use crate::io::snapshot::load_snapshot;
    use std::collections::BTreeMap;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(["sh", "-c", script])
    }

    fn config(chain: Vec<StageSpec>, max_loops: u32) -> RelayFileConfig {
        RelayFileConfig {
            relay: ChainConfig {
                max_loops,
                pacing_ms: 0,
                ..ChainConfig::new(chain)
            },
            event_log: None,
            agents: BTreeMap::new(),
            middleware: BTreeMap::new(),
            evaluator: None,
        }
    }

    #[test]
    fn runs_command_chain_end_to_end() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cfg = config(vec![StageSpec::new("wrap").with_middleware("upper")], 2);
        cfg.agents
            .insert("wrap".to_string(), sh("printf 'w(%s)' \"$(cat)\""));
        cfg.middleware.insert("upper".to_string(), sh("tr a-z A-Z"));
        cfg.event_log = Some(temp.path().join("logs/session_log.txt"));
        let history_out = temp.path().join("history.json");

        let report = run_with_config(
            &cfg,
            "hi",
            &RunOptions {
                history_out: Some(&history_out),
            },
        )
        .expect("run");

        assert_eq!(report.outcome.result, "W(W(HI))");
        assert_eq!(report.outcome.stop, RelayStop::Exhausted { max_loops: 2 });
        assert_eq!(
            report.summary,
            "user_input: hi\nwrap_output_0: W(HI)\nwrap_output_1: W(W(HI))"
        );

        let snapshot = load_snapshot(&history_out).expect("snapshot");
        assert_eq!(snapshot.session_id, report.outcome.session_id);
        assert_eq!(snapshot.state, "exhausted");
        assert_eq!(snapshot.history.get_latest(), Some("W(W(HI))"));

        let log = std::fs::read_to_string(temp.path().join("logs/session_log.txt"))
            .expect("event log");
        assert_eq!(log.matches("[LOOP ITERATION]").count(), 2);
        assert!(log.contains("[DISPATCHING] wrap with middleware: upper"));
    }

    #[test]
    fn evaluator_command_can_stop_the_session() {
        let mut cfg = config(vec![StageSpec::new("count")], 10);
        cfg.agents
            .insert("count".to_string(), sh("printf '%sx' \"$(cat)\""));
        cfg.evaluator = Some(sh(
            "if [ \"$RELAY_ROUND\" -ge 2 ]; then echo terminate; else echo continue; fi",
        ));

        let report = run_with_config(&cfg, "", &RunOptions::default()).expect("run");

        assert_eq!(report.outcome.result, "xxx");
        assert_eq!(report.outcome.rounds_executed, 3);
        assert_eq!(
            report.outcome.stop,
            RelayStop::TerminatedByEvaluator { round: 2 }
        );
    }

    #[test]
    fn failed_run_still_writes_partial_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cfg = config(vec![StageSpec::new("ok"), StageSpec::new("bad")], 1);
        cfg.agents.insert("ok".to_string(), CommandSpec::new(["cat"]));
        cfg.agents
            .insert("bad".to_string(), sh("echo nope >&2; exit 1"));
        let history_out = temp.path().join("history.json");

        let err = run_with_config(
            &cfg,
            "input",
            &RunOptions {
                history_out: Some(&history_out),
            },
        )
        .unwrap_err();

        let relay_err = err.downcast_ref::<RelayError>().expect("relay error");
        assert!(matches!(relay_err, RelayError::AgentInvocation { agent, .. } if agent == "bad"));

        let snapshot = load_snapshot(&history_out).expect("snapshot");
        assert_eq!(snapshot.state, "failed");
        let labels: Vec<&str> = snapshot.history.labels().collect();
        assert_eq!(labels, vec!["user_input", "ok_output_0"]);
    }

    #[test]
    fn unknown_agent_is_reported_before_running() {
        let cfg = config(vec![StageSpec::new("missing")], 1);
        let err = build_engine(&cfg).err().expect("must fail");
        assert!(format!("{err:#}").contains("unknown agent \"missing\""));
    }
}
