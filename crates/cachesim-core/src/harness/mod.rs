//! Process harness for the external simulation engine.
//!
//! This module defines the [`SimulationRunner`] trait the invocation
//! pipeline talks to, the [`ProcessHarness`] that implements it against a
//! real subprocess, and the outcome types ([`SimulationOutcome`],
//! [`RunStatus`]).
//!
//! # Lifecycle
//!
//! ```text
//! Idle --spawn--> Launching --write stdin, close--> Writing
//!   |                 |                                |
//!   |                 +--spawn error--> LaunchFailed   v
//!   |                                              Draining (stdout + stderr tasks)
//!   |                                                  |
//!   |        +-------------+-------------+-------------+-------------+
//!   |        v             v             v             v             v
//!   |    Completed      Crashed       TimedOut     Cancelled     HarnessError
//! ```

pub mod error;
pub mod process;
pub mod trait_def;
pub mod types;

// Re-export the primary public API at the module level.
pub use error::{HarnessError, Stream};
pub use process::{DEFAULT_KILL_GRACE, ProcessHarness};
pub use trait_def::SimulationRunner;
pub use types::{EngineCommand, RunStatus, SimulationOutcome};
