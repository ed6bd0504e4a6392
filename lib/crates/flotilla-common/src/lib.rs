//! Shared types for the flotilla fleet manager.
//!
//! Everything here is plain serde data — no I/O, no process spawning —
//! so both the CLI and its tests can depend on it freely.

pub mod types;
