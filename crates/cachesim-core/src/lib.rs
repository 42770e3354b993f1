//! Invocation harness for an external cache simulation engine.
//!
//! The engine is an opaque executable that reads five lines on stdin and
//! writes its report to stdout/stderr. This crate validates the user's
//! parameters ([`config`]), encodes them ([`request`]), runs the engine
//! ([`harness`]) and renders what it printed ([`transcript`]).
//! [`invocation::Simulator`] chains the four stages.

pub mod config;
pub mod harness;
pub mod invocation;
pub mod request;
pub mod transcript;

pub use config::{Field, GeometryAdvisory, RawFields, SimulationConfig, ValidationError, validate};
pub use harness::{
    EngineCommand, HarnessError, ProcessHarness, RunStatus, SimulationOutcome, SimulationRunner,
};
pub use invocation::{Invocation, InvocationError, Simulator};
pub use request::{SimulationRequest, encode};
pub use transcript::{RenderedTranscript, ScrollAnchor, TranscriptSink};
