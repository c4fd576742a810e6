//! Test-only collaborators with scripted behaviour and shared call logs.
//!
//! Every type here is cheap to clone and clones share state, so a test can
//! hand one copy to the engine and keep another to inspect afterwards.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};

use crate::capability::{Agent, Evaluator, Middleware};
use crate::core::chain::{ChainConfig, StageSpec};
use crate::core::history::HistoryStore;
use crate::core::types::Verdict;
use crate::io::event_log::{EventKind, EventSink, RelayEvent};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One recorded `(identifier, input)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub id: String,
    pub input: String,
}

type Respond = dyn Fn(&str, &str) -> Result<String> + Send + Sync;

/// Agent/middleware that answers through a closure and records every call.
#[derive(Clone)]
pub struct RecordingCapability {
    respond: Arc<Respond>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingCapability {
    /// Wrap an infallible formatter: `(id, input) -> output`.
    pub fn new<F>(format: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        Self::fallible(move |id, input| Ok(format(id, input)))
    }

    pub fn fallible<F>(respond: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            respond: Arc::new(respond),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `"<ID>(<input>)"` with the identifier upper-cased, e.g. `A(hello)`.
    pub fn wrapping() -> Self {
        Self::new(|id, input| format!("{}({input})", id.to_uppercase()))
    }

    /// Fails every call with `message`.
    pub fn failing(message: &'static str) -> Self {
        Self::fallible(move |_, _| Err(anyhow!(message)))
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn call(&self, id: &str, input: &str) -> Result<String> {
        lock(&self.calls).push(Call {
            id: id.to_string(),
            input: input.to_string(),
        });
        (self.respond)(id, input)
    }
}

impl Agent for RecordingCapability {
    fn invoke(&self, agent_id: &str, prompt: &str) -> Result<String> {
        self.call(agent_id, prompt)
    }
}

impl Middleware for RecordingCapability {
    fn transform(&self, middleware_id: &str, text: &str) -> Result<String> {
        self.call(middleware_id, text)
    }
}

/// What the evaluator saw on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub round: u32,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
enum Script {
    Verdicts(VecDeque<Verdict>),
    Fail(&'static str),
}

/// Evaluator that replays scripted verdicts, then answers `continue`.
#[derive(Debug, Clone)]
pub struct ScriptedEvaluator {
    script: Arc<Mutex<Script>>,
    seen: Arc<Mutex<Vec<Evaluation>>>,
}

impl ScriptedEvaluator {
    pub fn new(verdicts: Vec<Verdict>) -> Self {
        Self::from_script(Script::Verdicts(verdicts.into()))
    }

    pub fn always_continue() -> Self {
        Self::new(Vec::new())
    }

    /// `continue` for rounds before `round`, then `terminate`.
    pub fn terminate_at(round: u32) -> Self {
        let mut verdicts = vec![Verdict::Continue; round as usize];
        verdicts.push(Verdict::Terminate);
        Self::new(verdicts)
    }

    pub fn failing(message: &'static str) -> Self {
        Self::from_script(Script::Fail(message))
    }

    fn from_script(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn evaluations(&self) -> Vec<Evaluation> {
        lock(&self.seen).clone()
    }

    pub fn rounds_seen(&self) -> Vec<u32> {
        lock(&self.seen).iter().map(|eval| eval.round).collect()
    }
}

impl Evaluator for ScriptedEvaluator {
    fn evaluate(&self, history: &HistoryStore, round: u32) -> Result<Verdict> {
        lock(&self.seen).push(Evaluation {
            round,
            labels: history.labels().map(str::to_string).collect(),
        });
        match &mut *lock(&self.script) {
            Script::Verdicts(queue) => Ok(queue.pop_front().unwrap_or(Verdict::Continue)),
            Script::Fail(message) => Err(anyhow!(*message)),
        }
    }
}

/// Event sink that keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<RelayEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        lock(&self.events).iter().map(|event| event.kind).collect()
    }

    pub fn messages_of(&self, kind: EventKind) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter(|event| event.kind == kind)
            .map(|event| event.message.clone())
            .collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &RelayEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Chain of plain stages with pacing disabled so tests never sleep.
pub fn chain_of(agents: &[&str], max_loops: u32) -> ChainConfig {
    ChainConfig {
        max_loops,
        pacing_ms: 0,
        ..ChainConfig::new(agents.iter().map(|id| StageSpec::new(*id)).collect())
    }
}
