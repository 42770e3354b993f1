//! Value types shared by the harness and its callers.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

/// Fully resolved engine command.
///
/// The harness never guesses where the engine lives; the caller resolves
/// the platform-specific path and passes it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    /// Executable to launch.
    pub program: PathBuf,
    /// Extra arguments. The bundled engine takes none.
    pub args: Vec<String>,
    /// Working directory for the child, or the caller's when `None`.
    pub working_dir: Option<PathBuf>,
}

impl EngineCommand {
    /// Platform default used when nothing else is configured.
    #[cfg(windows)]
    pub const DEFAULT_PROGRAM: &str = "./cache_simulator.exe";
    #[cfg(not(windows))]
    pub const DEFAULT_PROGRAM: &str = "./cache_simulator";

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Set command arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl Default for EngineCommand {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM)
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// The engine exited on its own, with any exit code.
    Completed { exit_code: i32 },
    /// The engine was killed by a signal, or went away before reading its
    /// request.
    ///
    /// "Went away before reading" is only seen when writing the request
    /// fails with a broken pipe. A request larger than the pipe buffer
    /// always hits that; a small one lands in the buffer or not depending
    /// on scheduling, so an engine that exits without reading a small
    /// request may be reported as either `Crashed` or `Completed`.
    Crashed {
        signal: Option<i32>,
        reason: String,
    },
    /// The executable could not be started.
    LaunchFailed { reason: String },
    /// The configured timeout expired and the engine was terminated.
    TimedOut {
        #[serde(with = "duration_ms")]
        after: Duration,
    },
    /// The caller cancelled the run and the engine was terminated.
    Cancelled,
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed { .. })
    }

    /// Short lowercase name for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed { .. } => "completed",
            RunStatus::Crashed { .. } => "crashed",
            RunStatus::LaunchFailed { .. } => "launch_failed",
            RunStatus::TimedOut { .. } => "timed_out",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed { exit_code } => write!(f, "completed (exit code {exit_code})"),
            RunStatus::Crashed {
                signal: Some(sig),
                reason,
            } => write!(f, "crashed: {reason} (signal {sig})"),
            RunStatus::Crashed { signal: None, reason } => write!(f, "crashed: {reason}"),
            RunStatus::LaunchFailed { reason } => write!(f, "failed to launch engine: {reason}"),
            RunStatus::TimedOut { after } => write!(f, "timed out after {}s", after.as_secs_f64()),
            RunStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Everything captured from one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationOutcome {
    pub invocation_id: Uuid,
    #[serde(flatten)]
    pub status: RunStatus,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

impl SimulationOutcome {
    pub(crate) fn launch_failed(invocation_id: Uuid, reason: String, duration: Duration) -> Self {
        Self {
            invocation_id,
            status: RunStatus::LaunchFailed { reason },
            stdout: String::new(),
            stderr: String::new(),
            duration,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
