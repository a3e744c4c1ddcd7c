//! Headless recording and verification of lockstep sessions.
//!
//! This crate drives the simulation core without any presentation layer:
//!
//! - **Recording**: play a scripted [`Scenario`] and write the resulting
//!   replay together with a per-tick hash trace
//! - **Verification**: re-simulate a replay from its embedded snapshot and
//!   check that every peer would reach the same state hash
//! - **Inspection**: summarize a replay without simulating it
//!
//! # Example
//!
//! ```bash
//! # Record a scenario
//! cargo run -p lockstep_headless -- record scenarios/patrol.ron -o patrol.replay --trace patrol.json
//!
//! # Verify it, locating the first divergent frame against the trace
//! cargo run -p lockstep_headless -- verify patrol.replay --trace patrol.json
//! ```

pub mod error;
pub mod scenario;
pub mod trace;
pub mod verifier;

pub use error::{HeadlessError, Result};
pub use scenario::{Recording, Scenario, Session};
pub use trace::{HashTrace, TickRecord};
pub use verifier::{inspect_replay, verify_replay, ReplaySummary, Verification, VerificationReport};
