//! Deterministic, pure logic shared by the relay engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod chain;
pub mod error;
pub mod history;
pub mod types;
