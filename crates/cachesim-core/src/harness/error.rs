use thiserror::Error;

/// Stream of the engine a failure relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stream::Stdin => "stdin",
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        })
    }
}

/// Failures the harness cannot fold into a [`super::RunStatus`].
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("another simulation is already running")]
    Busy,

    #[error("I/O error on engine {stream}: {source}")]
    Stream {
        stream: Stream,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for engine process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("engine {stream} reader task failed: {source}")]
    Join {
        stream: Stream,
        #[source]
        source: tokio::task::JoinError,
    },
}
