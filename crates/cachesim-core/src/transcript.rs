//! Rendering of a captured outcome for display.

use serde::Serialize;

use crate::harness::{RunStatus, SimulationOutcome};

/// Separates the engine's diagnostic output from its primary output.
pub const DIAGNOSTICS_MARKER: &str = "\nErrors:\n";

/// Where a consumer should position its view of the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollAnchor {
    /// Results are read top-down.
    Top,
}

/// Display-ready text for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTranscript {
    /// Stdout, then (if any) the diagnostics marker and stderr.
    pub text: String,
    pub scroll: ScrollAnchor,
    /// Whether a diagnostics section was appended.
    pub diagnostics: bool,
    /// Status line for anything other than a normal completion.
    pub notice: Option<String>,
}

/// Stateless renderer: every call builds a fresh transcript.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptSink;

impl TranscriptSink {
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, outcome: &SimulationOutcome) -> RenderedTranscript {
        let mut text = String::with_capacity(
            outcome.stdout.len() + DIAGNOSTICS_MARKER.len() + outcome.stderr.len(),
        );
        text.push_str(&outcome.stdout);
        let diagnostics = !outcome.stderr.is_empty();
        if diagnostics {
            text.push_str(DIAGNOSTICS_MARKER);
            text.push_str(&outcome.stderr);
        }

        let notice = match &outcome.status {
            RunStatus::Completed { .. } => None,
            other => Some(other.to_string()),
        };

        RenderedTranscript {
            text,
            scroll: ScrollAnchor::Top,
            diagnostics,
            notice,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;

    fn outcome(status: RunStatus, stdout: &str, stderr: &str) -> SimulationOutcome {
        SimulationOutcome {
            invocation_id: Uuid::new_v4(),
            status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn stdout_only_has_no_marker() {
        let rendered = TranscriptSink::new().record(&outcome(
            RunStatus::Completed { exit_code: 0 },
            "Hits: 3\nMisses: 1\n",
            "",
        ));

        assert_eq!(rendered.text, "Hits: 3\nMisses: 1\n");
        assert!(!rendered.diagnostics);
        assert!(!rendered.text.contains(DIAGNOSTICS_MARKER));
        assert!(rendered.notice.is_none());
        assert_eq!(rendered.scroll, ScrollAnchor::Top);
    }

    #[test]
    fn stderr_is_appended_after_marker() {
        let rendered = TranscriptSink::new().record(&outcome(
            RunStatus::Completed { exit_code: 1 },
            "partial\n",
            "Error: Invalid access type: X\n",
        ));

        assert_eq!(
            rendered.text,
            "partial\n\nErrors:\nError: Invalid access type: X\n"
        );
        assert!(rendered.diagnostics);
        assert!(rendered.notice.is_none(), "non-zero exit is still a completion");
    }

    #[test]
    fn stderr_without_stdout_still_gets_marker() {
        let rendered = TranscriptSink::new().record(&outcome(
            RunStatus::Completed { exit_code: 1 },
            "",
            "boom",
        ));
        assert_eq!(rendered.text, "\nErrors:\nboom");
    }

    #[test]
    fn crash_keeps_text_and_adds_notice() {
        let rendered = TranscriptSink::new().record(&outcome(
            RunStatus::Crashed {
                signal: Some(9),
                reason: "engine terminated by signal 9".into(),
            },
            "Simulating Instruction Cache:\n",
            "",
        ));

        assert_eq!(rendered.text, "Simulating Instruction Cache:\n");
        let notice = rendered.notice.expect("crash should carry a notice");
        assert!(notice.contains("crashed"), "unexpected notice: {notice}");
    }

    #[test]
    fn launch_failure_renders_empty_text() {
        let rendered = TranscriptSink::new().record(&outcome(
            RunStatus::LaunchFailed {
                reason: "./cache_simulator: No such file or directory".into(),
            },
            "",
            "",
        ));
        assert!(rendered.text.is_empty());
        assert!(rendered.notice.unwrap().contains("failed to launch"));
    }

    #[test]
    fn each_record_starts_fresh() {
        let sink = TranscriptSink::new();
        let first = sink.record(&outcome(RunStatus::Completed { exit_code: 0 }, "one\n", "warn"));
        let second = sink.record(&outcome(RunStatus::Completed { exit_code: 0 }, "two\n", ""));

        assert!(first.text.contains("one"));
        assert_eq!(second.text, "two\n");
    }
}
