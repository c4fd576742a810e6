//! The relay engine: bounded rounds over a fixed chain of stages.
//!
//! Each round runs every stage in order, feeding each recorded output to the
//! next stage as its prompt, then asks the evaluator whether to go again.
//! A session ends when the evaluator answers `terminate`, when `max_loops`
//! rounds have run, or on the first collaborator failure.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::capability::Evaluator;
use crate::core::budget::{deadline_from, is_expired};
use crate::core::chain::{ChainConfig, USER_INPUT_LABEL, output_label};
use crate::core::error::RelayError;
use crate::core::history::HistoryStore;
use crate::core::types::{RelayOutcome, RelayState, RelayStop, RoundSeed, Verdict};
use crate::io::event_log::{EventKind, EventSink, RelayEvent};
use crate::registry::{CapabilityRegistry, ResolvedStage};

/// One relay session. Build a new engine for every input.
pub struct RelayEngine {
    session_id: String,
    config: ChainConfig,
    session_timeout: Option<Duration>,
    stages: Vec<ResolvedStage>,
    evaluator: Arc<dyn Evaluator>,
    sink: Arc<dyn EventSink>,
    history: HistoryStore,
    round: u32,
    state: RelayState,
}

impl RelayEngine {
    /// Validate `config` and resolve every stage against `registry`.
    ///
    /// All configuration problems surface here, before any round executes.
    pub fn new(
        config: ChainConfig,
        registry: &CapabilityRegistry,
        evaluator: impl Evaluator + 'static,
        sink: impl EventSink + 'static,
    ) -> Result<Self, RelayError> {
        Self::with_shared(config, registry, Arc::new(evaluator), Arc::new(sink))
    }

    pub fn with_shared(
        config: ChainConfig,
        registry: &CapabilityRegistry,
        evaluator: Arc<dyn Evaluator>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        let stages = registry.resolve(&config.chain)?;
        let session_id = Uuid::new_v4().to_string();
        debug!(
            session_id = %session_id,
            stages = stages.len(),
            max_loops = config.max_loops,
            "relay session initialized"
        );
        Ok(Self {
            session_id,
            session_timeout: config.session_timeout(),
            config,
            stages,
            evaluator,
            sink,
            history: HistoryStore::new(),
            round: 0,
            state: RelayState::Initialized,
        })
    }

    /// Override the session deadline with sub-second precision.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Everything recorded so far, including partial rounds after a failure.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Current 0-based round index.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Run the chain on `user_input` until the evaluator terminates the
    /// session or `max_loops` rounds have run.
    ///
    /// The outcome's `result` is the latest recorded value: the last stage's
    /// output, or `user_input` itself when no stage ran.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub fn execute_chain(&mut self, user_input: &str) -> Result<RelayOutcome, RelayError> {
        if self.state != RelayState::Initialized {
            return Err(RelayError::AlreadyExecuted);
        }
        self.state = RelayState::Running;
        self.emit(EventKind::SessionStarted, self.session_id.clone());
        self.history.store(USER_INPUT_LABEL, user_input);
        self.round = 0;

        let deadline = deadline_from(Instant::now(), self.session_timeout);
        let stop = match self.run_rounds(user_input, deadline) {
            Ok(stop) => stop,
            Err(err) => {
                self.state = RelayState::Failed;
                warn!(err = %err, round = ?err.round(), "relay session failed");
                return Err(err);
            }
        };

        let rounds_executed = match stop {
            RelayStop::TerminatedByEvaluator { round } => round + 1,
            RelayStop::Exhausted { max_loops } => max_loops,
        };
        info!(rounds_executed, stop = ?stop, "relay session finished");
        Ok(RelayOutcome {
            session_id: self.session_id.clone(),
            // `user_input` was recorded first, so there is always a latest value.
            result: self.history.get_latest().unwrap_or_default().to_string(),
            rounds_executed,
            stop,
        })
    }

    fn run_rounds(
        &mut self,
        user_input: &str,
        deadline: Option<Instant>,
    ) -> Result<RelayStop, RelayError> {
        let max_loops = self.config.max_loops;
        let mut prompt = user_input.to_string();

        while self.round < max_loops {
            self.state = RelayState::Running;
            let round = self.round;
            self.emit(EventKind::LoopIteration, (round + 1).to_string());

            prompt = self.run_round(round, prompt, deadline)?;

            let verdict = self
                .evaluator
                .evaluate(&self.history, round)
                .map_err(|source| RelayError::Evaluator {
                    round,
                    source: source.into(),
                })?;
            debug!(round, %verdict, "round evaluated");

            if verdict == Verdict::Terminate {
                self.emit(EventKind::LoopTerminated, round.to_string());
                self.state = RelayState::TerminatedByEvaluator;
                return Ok(RelayStop::TerminatedByEvaluator { round });
            }

            self.round += 1;
            if self.round < max_loops {
                self.state = RelayState::Continuing;
                if self.config.round_seed == RoundSeed::OriginalInput {
                    prompt = user_input.to_string();
                }
                self.pace();
            }
        }

        self.emit(EventKind::RoundsExhausted, max_loops.to_string());
        self.state = RelayState::Exhausted;
        Ok(RelayStop::Exhausted { max_loops })
    }

    /// Run every stage once. Returns the last recorded output, or `prompt`
    /// unchanged for an empty chain.
    fn run_round(
        &mut self,
        round: u32,
        mut prompt: String,
        deadline: Option<Instant>,
    ) -> Result<String, RelayError> {
        for stage in &self.stages {
            if is_expired(deadline, Instant::now()) {
                return Err(RelayError::DeadlineExceeded {
                    round,
                    timeout: self.session_timeout.unwrap_or_default(),
                });
            }

            let agent_id = stage.agent_id();
            let middleware_id = stage.middleware_id();
            self.sink.record(&RelayEvent::now(
                EventKind::Dispatching,
                format!(
                    "{agent_id} with middleware: {}",
                    middleware_id.unwrap_or("none")
                ),
            ));

            let raw = stage.agent.invoke(agent_id, &prompt).map_err(|source| {
                RelayError::AgentInvocation {
                    agent: agent_id.to_string(),
                    round,
                    source: source.into(),
                }
            })?;

            let output = match (middleware_id, &stage.middleware) {
                (Some(id), Some(middleware)) => {
                    middleware
                        .transform(id, &raw)
                        .map_err(|source| RelayError::Middleware {
                            middleware: id.to_string(),
                            agent: agent_id.to_string(),
                            round,
                            source: source.into(),
                        })?
                }
                _ => raw,
            };

            let label = output_label(agent_id, round);
            debug!(label = %label, output_bytes = output.len(), "stage output recorded");
            self.history.store(label, output.as_str());
            prompt = output;
        }
        Ok(prompt)
    }

    fn pace(&self) {
        let pacing = self.config.pacing();
        if !pacing.is_zero() {
            thread::sleep(pacing);
        }
    }

    fn emit(&self, kind: EventKind, message: impl Into<String>) {
        self.sink.record(&RelayEvent::now(kind, message));
    }
}
