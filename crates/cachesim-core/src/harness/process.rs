//! Subprocess harness for the external simulation engine.
//!
//! One [`ProcessHarness::run`] call walks the engine through
//! launch -> write request -> drain -> classify. Stdout and stderr are
//! drained by their own tasks while the harness waits for exit, so a child
//! that fills one pipe never stalls on the other.

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{HarnessError, Stream};
use super::trait_def::SimulationRunner;
use super::types::{EngineCommand, RunStatus, SimulationOutcome};
use crate::request::SimulationRequest;

/// How long a terminated engine gets to exit, and its readers to reach
/// end-of-stream, before being killed outright.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

type ReaderHandle = JoinHandle<std::io::Result<()>>;

/// Bytes a reader has taken off its pipe so far. Lives outside the reader
/// task so an aborted reader still leaves its output behind.
type Captured = Arc<StdMutex<Vec<u8>>>;

/// Runs the external engine, one invocation at a time.
pub struct ProcessHarness {
    engine: EngineCommand,
    /// Cached display form of `engine.program` for log fields.
    name: String,
    timeout: Option<Duration>,
    kill_grace: Duration,
    /// Held for the duration of a run. Two children never share a harness.
    gate: Mutex<()>,
}

impl std::fmt::Debug for ProcessHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHarness")
            .field("engine", &self.engine)
            .field("timeout", &self.timeout)
            .field("kill_grace", &self.kill_grace)
            .finish()
    }
}

impl ProcessHarness {
    /// Create a harness for `engine` with no timeout.
    pub fn new(engine: EngineCommand) -> Self {
        let name = engine.program.display().to_string();
        Self {
            engine,
            name,
            timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
            gate: Mutex::new(()),
        }
    }

    /// Terminate the engine if a run takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override [`DEFAULT_KILL_GRACE`].
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn engine(&self) -> &EngineCommand {
        &self.engine
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether an invocation is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Run `request`, waiting for any in-flight invocation to finish first.
    pub async fn run(
        &self,
        request: SimulationRequest,
        cancel: CancellationToken,
    ) -> Result<SimulationOutcome, HarnessError> {
        let _guard = self.gate.lock().await;
        self.run_exclusive(request, cancel).await
    }

    /// Run `request`, or fail with [`HarnessError::Busy`] if another
    /// invocation is in flight.
    pub async fn try_run(
        &self,
        request: SimulationRequest,
        cancel: CancellationToken,
    ) -> Result<SimulationOutcome, HarnessError> {
        let _guard = self.gate.try_lock().map_err(|_| HarnessError::Busy)?;
        self.run_exclusive(request, cancel).await
    }

    async fn run_exclusive(
        &self,
        request: SimulationRequest,
        cancel: CancellationToken,
    ) -> Result<SimulationOutcome, HarnessError> {
        let invocation_id = Uuid::new_v4();
        let started = Instant::now();

        // -- Launching -------------------------------------------------------

        let mut cmd = Command::new(&self.engine.program);
        cmd.args(&self.engine.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.engine.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group, so termination reaches anything the engine forks.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(%invocation_id, engine = %self.name, error = %e, "failed to launch engine");
                return Ok(SimulationOutcome::launch_failed(
                    invocation_id,
                    format!("{}: {e}", self.name),
                    started.elapsed(),
                ));
            }
        };
        let pid = child.id();
        info!(%invocation_id, engine = %self.name, pid, "engine started");

        // -- Writing / Draining ------------------------------------------------

        let stdout_buf = Captured::default();
        let stderr_buf = Captured::default();
        let mut stdin_task = tokio::spawn(feed(child.stdin.take(), request.into_bytes()));
        let mut stdout_task: ReaderHandle =
            tokio::spawn(drain(child.stdout.take(), Arc::clone(&stdout_buf)));
        let mut stderr_task: ReaderHandle =
            tokio::spawn(drain(child.stderr.take(), Arc::clone(&stderr_buf)));

        let watch = Watch::new(self.timeout, &cancel);
        let mut interrupt = None;
        let mut exit_status = None;
        let mut stdout_result = None;
        let mut stderr_result = None;

        match watch.race(child.wait()).await {
            Ok(status) => exit_status = Some(status.map_err(HarnessError::Wait)?),
            Err(i) => interrupt = Some(i),
        }
        if interrupt.is_none() {
            match watch.race(&mut stdout_task).await {
                Ok(res) => stdout_result = Some(res),
                Err(i) => interrupt = Some(i),
            }
        }
        if interrupt.is_none() {
            match watch.race(&mut stderr_task).await {
                Ok(res) => stderr_result = Some(res),
                Err(i) => interrupt = Some(i),
            }
        }

        // -- Classification ------------------------------------------------------

        let status = match interrupt {
            Some(interrupt) => {
                info!(%invocation_id, pid, reason = interrupt.as_str(), "terminating engine");
                terminate(&mut child, pid, self.kill_grace).await;
                stdin_task.abort();
                if stdout_result.is_none() {
                    stdout_result = settle(&mut stdout_task, self.kill_grace, Stream::Stdout).await;
                }
                if stderr_result.is_none() {
                    stderr_result = settle(&mut stderr_task, self.kill_grace, Stream::Stderr).await;
                }
                interrupt.into_status()
            }
            None => {
                let stdin_broken = match (&mut stdin_task).await {
                    Ok(Ok(())) => false,
                    Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => true,
                    Ok(Err(e)) => {
                        return Err(HarnessError::Stream {
                            stream: Stream::Stdin,
                            source: e,
                        });
                    }
                    Err(e) => {
                        return Err(HarnessError::Join {
                            stream: Stream::Stdin,
                            source: e,
                        });
                    }
                };
                match exit_status {
                    Some(exit) => classify(exit, stdin_broken),
                    None => RunStatus::Crashed {
                        signal: None,
                        reason: "engine exit status unavailable".to_string(),
                    },
                }
            }
        };

        let stdout = collect(Stream::Stdout, stdout_result, &stdout_buf)?;
        let stderr = collect(Stream::Stderr, stderr_result, &stderr_buf)?;
        let duration = started.elapsed();

        info!(
            %invocation_id,
            pid,
            status = status.as_str(),
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "engine finished"
        );

        Ok(SimulationOutcome {
            invocation_id,
            status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration,
        })
    }
}

#[async_trait]
impl SimulationRunner for ProcessHarness {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        request: SimulationRequest,
        cancel: CancellationToken,
    ) -> Result<SimulationOutcome, HarnessError> {
        ProcessHarness::run(self, request, cancel).await
    }
}

// ---------------------------------------------------------------------------
// Stream helpers
// ---------------------------------------------------------------------------

/// Write the whole request, then close stdin so the engine sees EOF.
async fn feed(stdin: Option<ChildStdin>, bytes: Vec<u8>) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    stdin.write_all(&bytes).await?;
    stdin.shutdown().await?;
    drop(stdin);
    debug!(bytes = bytes.len(), "request written");
    Ok(())
}

/// Read a pipe to end-of-stream, appending each chunk to `sink` as it
/// arrives.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, sink: Captured) -> std::io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    let mut chunk = vec![0u8; 8 * 1024];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(&chunk[..n]);
    }
}

/// Wait up to `grace` for a reader after the engine was terminated.
///
/// `None` means the reader was abandoned; whatever it captured before that
/// is still in its buffer.
async fn settle(
    task: &mut ReaderHandle,
    grace: Duration,
    stream: Stream,
) -> Option<Result<std::io::Result<()>, JoinError>> {
    match tokio::time::timeout(grace, &mut *task).await {
        Ok(res) => Some(res),
        Err(_) => {
            warn!(%stream, "pipe still open after termination; keeping output read so far");
            task.abort();
            None
        }
    }
}

fn collect(
    stream: Stream,
    result: Option<Result<std::io::Result<()>, JoinError>>,
    captured: &Captured,
) -> Result<Vec<u8>, HarnessError> {
    match result {
        None | Some(Ok(Ok(()))) => Ok(std::mem::take(
            &mut *captured.lock().unwrap_or_else(PoisonError::into_inner),
        )),
        Some(Ok(Err(source))) => Err(HarnessError::Stream { stream, source }),
        Some(Err(source)) => Err(HarnessError::Join { stream, source }),
    }
}

// ---------------------------------------------------------------------------
// Timeout / cancellation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    TimedOut(Duration),
    Cancelled,
}

impl Interrupt {
    fn as_str(self) -> &'static str {
        match self {
            Interrupt::TimedOut(_) => "timeout",
            Interrupt::Cancelled => "cancelled",
        }
    }

    fn into_status(self) -> RunStatus {
        match self {
            Interrupt::TimedOut(after) => RunStatus::TimedOut { after },
            Interrupt::Cancelled => RunStatus::Cancelled,
        }
    }
}

/// Races each stage of a run against the deadline and the cancel token.
struct Watch<'a> {
    timeout: Option<Duration>,
    deadline: Option<tokio::time::Instant>,
    cancel: &'a CancellationToken,
}

impl<'a> Watch<'a> {
    fn new(timeout: Option<Duration>, cancel: &'a CancellationToken) -> Self {
        Self {
            timeout,
            deadline: timeout.map(|t| tokio::time::Instant::now() + t),
            cancel,
        }
    }

    /// `fut` must be cancel-safe: it is dropped if the run is interrupted.
    async fn race<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        let expiry = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            out = fut => Ok(out),
            () = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            () = expiry => Err(Interrupt::TimedOut(self.timeout.unwrap_or_default())),
        }
    }
}

/// Stop the engine: SIGTERM to its process group, then SIGKILL once
/// `grace` runs out.
async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
            // SAFETY: the child was spawned as the leader of process group `pid`.
            let ret = unsafe { libc::kill(-pid, libc::SIGTERM) };
            if ret != 0 {
                warn!(pid, "SIGTERM to engine process group failed, proceeding to SIGKILL");
            }

            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(_)) => debug!(pid, "engine exited after SIGTERM"),
                _ => debug!(pid, "engine did not exit after SIGTERM, sending SIGKILL"),
            }

            // Stragglers in the group would otherwise hold the output pipes open.
            // While any of them lives the group id stays reserved. If the group
            // is already empty and the leader reaped, the id is free again and a
            // new group could in principle have taken it in the meantime.
            // SAFETY: as above; ESRCH when the group is already gone is ignored.
            unsafe { libc::kill(-pid, libc::SIGKILL) };
        }
    }
    #[cfg(not(unix))]
    let _ = (pid, grace);

    if let Err(e) = child.kill().await {
        debug!(error = %e, "engine already reaped");
    }
}

/// Map an exit status onto a [`RunStatus`].
fn classify(status: ExitStatus, stdin_broken: bool) -> RunStatus {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return RunStatus::Crashed {
                signal: Some(signal),
                reason: format!("engine terminated by signal {signal}"),
            };
        }
    }

    if stdin_broken {
        return RunStatus::Crashed {
            signal: None,
            reason: "engine exited before reading its request".to_string(),
        };
    }

    match status.code() {
        // NTSTATUS failure codes (access violation, stack overflow, ...).
        #[cfg(windows)]
        Some(code) if (code as u32) & 0xC000_0000 == 0xC000_0000 => RunStatus::Crashed {
            signal: None,
            reason: format!("engine terminated abnormally (status {:#010x})", code as u32),
        },
        Some(exit_code) => RunStatus::Completed { exit_code },
        None => RunStatus::Crashed {
            signal: None,
            reason: "engine terminated abnormally".to_string(),
        },
    }
}
