//! Bounded agent relay.
//!
//! A relay session pushes user input through an ordered chain of agents,
//! each optionally followed by a middleware transform, and repeats the chain
//! for up to `max_loops` rounds. After every round an evaluator decides
//! whether to continue; every stage output lands in an ordered history.
//!
//! - **[`core`]**: Pure, deterministic logic (history, chain config, verdicts,
//!   error taxonomy). No I/O.
//! - **[`io`]**: Side-effecting adapters (subprocess capabilities, config
//!   files, event logs, snapshots).
//!
//! [`relay::RelayEngine`] drives a session; [`pipeline`] wires a `relay.toml`
//! into an engine for the CLI.

pub mod capability;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod relay;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
