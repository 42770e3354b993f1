//! Implementation of the `cachesim run` command.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cachesim_core::{
    Field, GeometryAdvisory, Invocation, ProcessHarness, RenderedTranscript, RunStatus,
    SimulationOutcome, Simulator,
};

use crate::config::CachesimConfig;

/// Exit code for a run terminated by the timeout (same as coreutils `timeout`).
pub const EXIT_TIMED_OUT: i32 = 124;
/// Exit code for a run cancelled with Ctrl-C.
pub const EXIT_CANCELLED: i32 = 130;

/// Parsed flags for `cachesim run`. Numeric values stay as the user typed
/// them so validation can name the offending field.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub icache: Option<String>,
    pub dcache: Option<String>,
    pub line_size: Option<String>,
    pub access_time: Option<String>,
    pub trace: String,
    pub strict: bool,
    pub dry_run: bool,
    pub json: bool,
}

/// What `--json` prints.
#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    outcome: &'a SimulationOutcome,
    advisories: &'a [GeometryAdvisory],
    transcript: &'a RenderedTranscript,
}

/// Process exit code for a finished run.
pub fn exit_code(status: &RunStatus) -> i32 {
    match status {
        RunStatus::Completed { exit_code } => *exit_code,
        RunStatus::Crashed { .. } | RunStatus::LaunchFailed { .. } => 1,
        RunStatus::TimedOut { .. } => EXIT_TIMED_OUT,
        RunStatus::Cancelled => EXIT_CANCELLED,
    }
}

/// Execute `cachesim run` and return the process exit code.
pub async fn run_simulation(args: RunArgs, config: &CachesimConfig) -> Result<i32> {
    let raw = config.raw_fields(
        &[
            (Field::InstructionCacheSize, args.icache.as_deref()),
            (Field::DataCacheSize, args.dcache.as_deref()),
            (Field::LineSize, args.line_size.as_deref()),
            (Field::AccessTimeCycles, args.access_time.as_deref()),
        ],
        &args.trace,
    );

    if args.dry_run {
        let validated = cachesim_core::validate(&raw)?;
        for advisory in validated.geometry_advisories() {
            eprintln!("warning: {advisory}");
        }
        print!("{}", cachesim_core::encode(validated).as_str());
        return Ok(0);
    }

    debug!(
        engine = %config.engine.program.display(),
        timeout_secs = config.timeout.map(|t| t.as_secs()),
        strict = args.strict,
        "resolved engine"
    );
    let harness = ProcessHarness::new(config.engine.clone()).with_timeout(config.timeout);
    let simulator = Simulator::new(Arc::new(harness)).strict_geometry(args.strict);

    let cancel = CancellationToken::new();
    let watcher = spawn_ctrl_c_watcher(cancel.clone());

    let result = simulator.invoke(&raw, cancel).await;
    watcher.abort();
    let invocation = result?;

    report(&invocation, args.json)
}

/// First Ctrl-C cancels the in-flight run; a second one exits immediately.
fn spawn_ctrl_c_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let got_first_signal = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if got_first_signal.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(EXIT_CANCELLED);
            }
            eprintln!("\nStopping the engine (Ctrl+C again to force)...");
            cancel.cancel();
        }
    })
}

/// Print an invocation and return the exit code it maps to.
fn report(invocation: &Invocation, json: bool) -> Result<i32> {
    let status = &invocation.outcome.status;

    if json {
        let report = JsonReport {
            outcome: &invocation.outcome,
            advisories: &invocation.advisories,
            transcript: &invocation.transcript,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(exit_code(status));
    }

    if let RunStatus::LaunchFailed { .. } = status {
        anyhow::bail!("{status}");
    }

    for advisory in &invocation.advisories {
        eprintln!("warning: {advisory}");
    }
    print!("{}", invocation.transcript.text);
    if let Some(notice) = &invocation.transcript.notice {
        eprintln!("cachesim: {notice}");
    }

    Ok(exit_code(status))
}
