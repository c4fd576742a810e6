//! Identifier → capability lookup, resolved once per session.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::capability::{Agent, Middleware};
use crate::core::chain::StageSpec;
use crate::core::error::ConfigError;
use crate::io::command::CommandCapability;
use crate::io::config::RelayFileConfig;

/// Registered agents and middleware, keyed by identifier.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    agents: BTreeMap<String, Arc<dyn Agent>>,
    middleware: BTreeMap<String, Arc<dyn Middleware>>,
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .field("middleware", &self.middleware.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command-backed capabilities for every `[agents.*]` and
    /// `[middleware.*]` table.
    pub fn from_file_config(cfg: &RelayFileConfig) -> Self {
        let mut registry = Self::new();
        for (id, spec) in &cfg.agents {
            registry.register_agent(id.clone(), CommandCapability::new(spec.clone()));
        }
        for (id, spec) in &cfg.middleware {
            registry.register_middleware(id.clone(), CommandCapability::new(spec.clone()));
        }
        registry
    }

    /// Register (or replace) the agent serving `id`.
    pub fn register_agent(&mut self, id: impl Into<String>, agent: impl Agent + 'static) {
        self.agents.insert(id.into(), Arc::new(agent));
    }

    pub fn register_middleware(
        &mut self,
        id: impl Into<String>,
        middleware: impl Middleware + 'static,
    ) {
        self.middleware.insert(id.into(), Arc::new(middleware));
    }

    pub fn has_agent(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn has_middleware(&self, id: &str) -> bool {
        self.middleware.contains_key(id)
    }

    /// Bind every stage to its capabilities, failing on the first identifier
    /// that has nothing registered.
    pub fn resolve(&self, chain: &[StageSpec]) -> Result<Vec<ResolvedStage>, ConfigError> {
        chain
            .iter()
            .map(|spec| -> Result<ResolvedStage, ConfigError> {
                let agent = self
                    .agents
                    .get(&spec.agent)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownAgent(spec.agent.clone()))?;
                let middleware = match &spec.middleware {
                    Some(id) => Some(
                        self.middleware
                            .get(id)
                            .cloned()
                            .ok_or_else(|| ConfigError::UnknownMiddleware(id.clone()))?,
                    ),
                    None => None,
                };
                Ok(ResolvedStage {
                    spec: spec.clone(),
                    agent,
                    middleware,
                })
            })
            .collect()
    }
}

/// A stage with its capabilities already looked up.
#[derive(Clone)]
pub struct ResolvedStage {
    pub spec: StageSpec,
    pub agent: Arc<dyn Agent>,
    pub middleware: Option<Arc<dyn Middleware>>,
}

impl ResolvedStage {
    pub fn agent_id(&self) -> &str {
        &self.spec.agent
    }

    pub fn middleware_id(&self) -> Option<&str> {
        self.spec.middleware.as_deref()
    }
}

impl fmt::Debug for ResolvedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedStage")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}
