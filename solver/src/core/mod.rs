//! Deterministic, pure logic shared by the solver.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod arena;
pub mod budget;
pub mod code;
pub mod decision;
pub mod fallback;
pub mod ranking;
pub mod repair;
pub mod types;
