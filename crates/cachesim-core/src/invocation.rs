//! One full validate -> encode -> run -> record cycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{self, GeometryAdvisory, RawFields, ValidationError};
use crate::harness::{HarnessError, SimulationOutcome, SimulationRunner};
use crate::request;
use crate::transcript::{RenderedTranscript, TranscriptSink};

/// Why an invocation produced no outcome.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("geometry rejected: {}", format_advisories(.0))]
    Geometry(Vec<GeometryAdvisory>),

    #[error(transparent)]
    Harness(#[from] HarnessError),
}

fn format_advisories(advisories: &[GeometryAdvisory]) -> String {
    advisories
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The product of a successful invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub advisories: Vec<GeometryAdvisory>,
    pub outcome: SimulationOutcome,
    pub transcript: RenderedTranscript,
}

/// Chains the validator, encoder, runner and transcript sink.
#[derive(Clone)]
pub struct Simulator {
    runner: Arc<dyn SimulationRunner>,
    sink: TranscriptSink,
    strict_geometry: bool,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("runner", &self.runner.name())
            .field("strict_geometry", &self.strict_geometry)
            .finish()
    }
}

impl Simulator {
    pub fn new(runner: Arc<dyn SimulationRunner>) -> Self {
        Self {
            runner,
            sink: TranscriptSink::new(),
            strict_geometry: false,
        }
    }

    /// Refuse to launch when the configuration has geometry advisories.
    pub fn strict_geometry(mut self, strict: bool) -> Self {
        self.strict_geometry = strict;
        self
    }

    /// Run one invocation. Nothing is launched unless validation passes.
    pub async fn invoke(
        &self,
        raw: &RawFields,
        cancel: CancellationToken,
    ) -> Result<Invocation, InvocationError> {
        let config = config::validate(raw)?;

        let advisories = config.geometry_advisories();
        for advisory in &advisories {
            warn!(%advisory, "configuration may be rejected by the engine");
        }
        if self.strict_geometry && !advisories.is_empty() {
            return Err(InvocationError::Geometry(advisories));
        }

        let request = request::encode(config);
        debug!(runner = self.runner.name(), bytes = request.len(), "dispatching request");

        let outcome = self.runner.run(request, cancel).await?;
        let transcript = self.sink.record(&outcome);

        Ok(Invocation {
            advisories,
            outcome,
            transcript,
        })
    }
}
