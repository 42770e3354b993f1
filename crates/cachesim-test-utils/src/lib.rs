//! Shared test utilities for cachesim integration tests.
//!
//! Provides stand-ins for the external simulation engine: small `/bin/sh`
//! scripts written into a temporary directory and marked executable, plus
//! access-sequence fixtures. The scripts consume their request before doing
//! anything else, so the harness never races a closed stdin.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A sample access sequence in the engine's input format: a 32-bit binary
/// address (grouped in nibbles) followed by `I` or `D`.
pub const SAMPLE_ACCESS_SEQUENCE: &str = "\
0000 0000 0000 0000 0000 0000 0000 0000 I
0000 0000 0000 0000 0000 0000 0001 0000 D
0000 0000 0000 0000 0000 0000 0000 0100 I
0000 0000 0000 0000 0000 0000 0001 0000 D
";

/// A fake engine script living in its own temporary directory.
///
/// The directory (and script) are removed when this value is dropped.
pub struct FakeEngine {
    dir: TempDir,
    path: PathBuf,
}

impl FakeEngine {
    /// Write a script that reads its whole stdin and then runs `body`.
    pub fn new(body: &str) -> Self {
        Self::raw(&format!("cat > /dev/null\n{body}"))
    }

    /// Write a script that runs `body` without touching stdin first.
    pub fn raw(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create fake engine dir");
        let path = dir.path().join("cache_simulator");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write fake engine");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("failed to make fake engine executable");
        }

        Self { dir, path }
    }

    /// Echo the request back on stdout, byte for byte.
    pub fn echo() -> Self {
        Self::raw("cat")
    }

    /// Path to the executable script.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The temporary directory holding the script.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Write [`SAMPLE_ACCESS_SEQUENCE`] to `dir/name` and return the path.
pub fn access_sequence_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, SAMPLE_ACCESS_SEQUENCE).expect("failed to write access sequence");
    path
}

/// Raw field values for a valid configuration pointing at `trace`.
pub fn raw_fields(trace: &Path) -> std::collections::HashMap<String, String> {
    std::collections::HashMap::from([
        ("instruction_cache_size".to_string(), "4096".to_string()),
        ("data_cache_size".to_string(), "4096".to_string()),
        ("line_size".to_string(), "16".to_string()),
        ("access_time_cycles".to_string(), "5".to_string()),
        (
            "access_sequence_path".to_string(),
            trace.to_str().expect("trace path should be UTF-8").to_string(),
        ),
    ])
}
