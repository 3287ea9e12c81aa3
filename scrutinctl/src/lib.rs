//! Command line driver for scrutin analysis runs.
//!
//! Wires the orchestration layer of `scrutin-core` to a line oriented
//! pattern engine over files on local disk. The binary is a thin shell over
//! these modules so the pieces stay testable without spawning processes.

#![allow(missing_docs)]

pub mod engine;
pub mod error;
pub mod report;
pub mod rules;
pub mod state;
pub mod workspace;
