//! The `SimulationRunner` trait -- the seam between the invocation pipeline
//! and whatever actually executes a request.
//!
//! [`super::ProcessHarness`] is the production implementation. The trait is
//! object-safe so the pipeline can hold an `Arc<dyn SimulationRunner>` and
//! tests can swap in a spy.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::HarnessError;
use super::types::SimulationOutcome;
use crate::request::SimulationRequest;

/// Executes one encoded request and reports how it went.
#[async_trait]
pub trait SimulationRunner: Send + Sync {
    /// Human-readable name for log fields (e.g. the engine path).
    fn name(&self) -> &str;

    /// Run `request` to completion.
    ///
    /// Launch failures, crashes, timeouts and cancellation are reported in
    /// the returned outcome's status. `Err` is reserved for failures the
    /// runner could not classify.
    async fn run(
        &self,
        request: SimulationRequest,
        cancel: CancellationToken,
    ) -> Result<SimulationOutcome, HarnessError>;
}

// Compile-time assertion: SimulationRunner must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn SimulationRunner) {}
};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::harness::RunStatus;

    /// Echoes the request back as stdout without launching anything.
    struct EchoRunner;

    #[async_trait]
    impl SimulationRunner for EchoRunner {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(
            &self,
            request: SimulationRequest,
            _cancel: CancellationToken,
        ) -> Result<SimulationOutcome, HarnessError> {
            Ok(SimulationOutcome {
                invocation_id: Uuid::new_v4(),
                status: RunStatus::Completed { exit_code: 0 },
                stdout: request.as_str().to_owned(),
                stderr: String::new(),
                duration: Duration::ZERO,
            })
        }
    }

    #[test]
    fn runner_is_object_safe() {
        let runner: Box<dyn SimulationRunner> = Box::new(EchoRunner);
        assert_eq!(runner.name(), "echo");
    }
}
