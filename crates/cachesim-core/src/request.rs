//! Encoding of a validated configuration into the engine's stdin format.
//!
//! The engine reads five lines, one value per line:
//!
//! ```text
//! <instruction cache size>
//! <data cache size>
//! <line size>
//! <access time>
//! <access sequence path>
//! ```

use std::fmt::Write as _;

use crate::config::SimulationConfig;

/// The bytes written to the engine's standard input for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    bytes: Vec<u8>,
}

impl SimulationRequest {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The request as text. Encoding only ever produces UTF-8.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[cfg(test)]
    pub(crate) fn from_text(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
        }
    }
}

/// Serialize `config` into the five-line wire format.
pub fn encode(config: SimulationConfig) -> SimulationRequest {
    let mut text = String::new();
    // Writing to a String is infallible.
    let _ = writeln!(text, "{}", config.instruction_cache_size());
    let _ = writeln!(text, "{}", config.data_cache_size());
    let _ = writeln!(text, "{}", config.line_size());
    let _ = writeln!(text, "{}", config.access_time_cycles());
    let _ = writeln!(text, "{}", config.access_sequence_text());

    SimulationRequest {
        bytes: text.into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RawFields, validate};

    fn config(icache: &str, dcache: &str, line: &str, access: &str, trace: &str) -> SimulationConfig {
        let raw = RawFields::from([
            ("instruction_cache_size".to_string(), icache.to_string()),
            ("data_cache_size".to_string(), dcache.to_string()),
            ("line_size".to_string(), line.to_string()),
            ("access_time_cycles".to_string(), access.to_string()),
            ("access_sequence_path".to_string(), trace.to_string()),
        ]);
        validate(&raw).expect("test config should validate")
    }

    #[test]
    fn encodes_five_lines_in_wire_order() {
        let trace = tempfile::NamedTempFile::new().unwrap();
        let path = trace.path().to_str().unwrap();

        let request = encode(config("4096", "2048", "16", "5", path));

        assert_eq!(request.as_str(), format!("4096\n2048\n16\n5\n{path}\n"));
        let lines: Vec<&str> = request.as_str().split_terminator('\n').collect();
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn numbers_are_normalized_to_plain_decimal() {
        let trace = tempfile::NamedTempFile::new().unwrap();
        let path = trace.path().to_str().unwrap();

        let request = encode(config(" +0064", "128 ", "008", "1", path));

        assert!(request.as_str().starts_with("64\n128\n8\n1\n"));
    }

    #[test]
    fn ends_with_exactly_one_newline() {
        let trace = tempfile::NamedTempFile::new().unwrap();
        let request = encode(config("1", "1", "1", "1", trace.path().to_str().unwrap()));

        assert!(request.as_str().ends_with('\n'));
        assert!(!request.as_str().ends_with("\n\n"));
        assert_eq!(request.as_bytes().iter().filter(|b| **b == b'\n').count(), 5);
    }

    #[test]
    fn path_is_passed_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let trace = dir.path().join("trace with spaces.txt");
        std::fs::write(&trace, "").unwrap();
        let path = trace.to_str().unwrap();

        let request = encode(config("4096", "4096", "16", "5", path));

        let last = request.as_str().lines().last().unwrap();
        assert_eq!(last, path);
    }
}
