//! I/O adapters for relay sessions.

pub mod command;
pub mod config;
pub mod event_log;
pub mod process;
pub mod snapshot;
