//! Collaborator seams the relay engine drives.
//!
//! The engine never executes stages itself. It hands prompts to an [`Agent`],
//! optional post-processing to a [`Middleware`], and the continue/stop call to
//! an [`Evaluator`]. Production wiring uses subprocess adapters
//! (`io::command`); tests use scripted implementations.

use anyhow::Result;

use crate::core::history::HistoryStore;
use crate::core::types::Verdict;

/// Stage invoker: turns a prompt into an output for a named agent.
pub trait Agent: Send + Sync {
    fn invoke(&self, agent_id: &str, prompt: &str) -> Result<String>;
}

/// Transform invoker: post-processes a stage's raw output.
pub trait Middleware: Send + Sync {
    fn transform(&self, middleware_id: &str, text: &str) -> Result<String>;
}

/// Round evaluator. Receives a shared borrow of the history, so it cannot
/// mutate what the session recorded.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, history: &HistoryStore, round: u32) -> Result<Verdict>;
}

impl<F> Agent for F
where
    F: Fn(&str, &str) -> Result<String> + Send + Sync,
{
    fn invoke(&self, agent_id: &str, prompt: &str) -> Result<String> {
        self(agent_id, prompt)
    }
}

impl<F> Middleware for F
where
    F: Fn(&str, &str) -> Result<String> + Send + Sync,
{
    fn transform(&self, middleware_id: &str, text: &str) -> Result<String> {
        self(middleware_id, text)
    }
}

impl<F> Evaluator for F
where
    F: Fn(&HistoryStore, u32) -> Result<Verdict> + Send + Sync,
{
    fn evaluate(&self, history: &HistoryStore, round: u32) -> Result<Verdict> {
        self(history, round)
    }
}

/// Evaluator that never stops early; the round budget alone bounds the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysContinue;

impl Evaluator for AlwaysContinue {
    fn evaluate(&self, _history: &HistoryStore, _round: u32) -> Result<Verdict> {
        Ok(Verdict::Continue)
    }
}
