//! Validation of raw, user-supplied simulation parameters.
//!
//! The presentation layer collects five strings (four numbers and a file
//! path). [`validate`] turns them into an immutable [`SimulationConfig`] or
//! rejects them with a field-attributed [`ValidationError`]. Nothing
//! downstream ever sees a partially validated configuration.

use std::collections::HashMap;
use std::fmt;
use std::num::IntErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Raw field values keyed by [`Field::key`].
pub type RawFields = HashMap<String, String>;

/// The five user-facing configuration fields, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    InstructionCacheSize,
    DataCacheSize,
    LineSize,
    AccessTimeCycles,
    AccessSequencePath,
}

impl Field {
    /// All fields in the order the engine reads them.
    pub const ALL: [Field; 5] = [
        Field::InstructionCacheSize,
        Field::DataCacheSize,
        Field::LineSize,
        Field::AccessTimeCycles,
        Field::AccessSequencePath,
    ];

    /// Map key used in [`RawFields`] and in the config file.
    pub fn key(self) -> &'static str {
        match self {
            Field::InstructionCacheSize => "instruction_cache_size",
            Field::DataCacheSize => "data_cache_size",
            Field::LineSize => "line_size",
            Field::AccessTimeCycles => "access_time_cycles",
            Field::AccessSequencePath => "access_sequence_path",
        }
    }

    /// Human-readable label, used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Field::InstructionCacheSize => "instruction cache size (bytes)",
            Field::DataCacheSize => "data cache size (bytes)",
            Field::LineSize => "cache line size (bytes)",
            Field::AccessTimeCycles => "cache access time (cycles)",
            Field::AccessSequencePath => "access sequence file",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reasons a set of raw fields is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must be a base-10 integer")]
    NotNumeric(Field),

    #[error("{0} must be a positive integer")]
    OutOfRange(Field),

    #[error("access sequence file not found or not readable: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("access sequence path must not contain a line break: {}", .0.display())]
    InvalidPath(PathBuf),
}

impl ValidationError {
    /// The field this error is attributed to.
    pub fn field(&self) -> Field {
        match self {
            ValidationError::NotNumeric(field) | ValidationError::OutOfRange(field) => *field,
            ValidationError::FileNotFound(_) | ValidationError::InvalidPath(_) => {
                Field::AccessSequencePath
            }
        }
    }
}

/// A fully validated simulation configuration.
///
/// Only [`validate`] constructs one, and there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationConfig {
    instruction_cache_size: u64,
    data_cache_size: u64,
    line_size: u64,
    access_time_cycles: u64,
    /// Kept exactly as typed; the engine receives this text verbatim.
    access_sequence: String,
}

impl SimulationConfig {
    pub fn instruction_cache_size(&self) -> u64 {
        self.instruction_cache_size
    }

    pub fn data_cache_size(&self) -> u64 {
        self.data_cache_size
    }

    pub fn line_size(&self) -> u64 {
        self.line_size
    }

    pub fn access_time_cycles(&self) -> u64 {
        self.access_time_cycles
    }

    pub fn access_sequence_path(&self) -> &Path {
        Path::new(&self.access_sequence)
    }

    /// The access sequence path as the user supplied it.
    pub fn access_sequence_text(&self) -> &str {
        &self.access_sequence
    }

    /// Geometry observations the bundled engine is known to reject.
    ///
    /// These never fail validation; the engine has the final say.
    pub fn geometry_advisories(&self) -> Vec<GeometryAdvisory> {
        let mut advisories = Vec::new();

        for (field, size) in [
            (Field::InstructionCacheSize, self.instruction_cache_size),
            (Field::DataCacheSize, self.data_cache_size),
        ] {
            if !size.is_power_of_two() {
                advisories.push(GeometryAdvisory::NotPowerOfTwo { field, value: size });
            }
            if self.line_size > size {
                advisories.push(GeometryAdvisory::LineExceedsCache {
                    field,
                    line_size: self.line_size,
                    cache_size: size,
                });
            } else if size % self.line_size != 0 {
                advisories.push(GeometryAdvisory::LineDoesNotDivide {
                    field,
                    line_size: self.line_size,
                    cache_size: size,
                });
            }
        }

        if !(ADVISED_ACCESS_TIME_MIN..=ADVISED_ACCESS_TIME_MAX).contains(&self.access_time_cycles) {
            advisories.push(GeometryAdvisory::AccessTimeOutsideRange {
                value: self.access_time_cycles,
            });
        }

        advisories
    }
}

const ADVISED_ACCESS_TIME_MIN: u64 = 1;
const ADVISED_ACCESS_TIME_MAX: u64 = 10;

/// A non-fatal observation about a [`SimulationConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeometryAdvisory {
    NotPowerOfTwo {
        field: Field,
        value: u64,
    },
    LineExceedsCache {
        field: Field,
        line_size: u64,
        cache_size: u64,
    },
    LineDoesNotDivide {
        field: Field,
        line_size: u64,
        cache_size: u64,
    },
    AccessTimeOutsideRange {
        value: u64,
    },
}

impl fmt::Display for GeometryAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryAdvisory::NotPowerOfTwo { field, value } => {
                write!(f, "{field} {value} is not a power of two")
            }
            GeometryAdvisory::LineExceedsCache {
                field,
                line_size,
                cache_size,
            } => write!(f, "line size {line_size} exceeds {field} {cache_size}"),
            GeometryAdvisory::LineDoesNotDivide {
                field,
                line_size,
                cache_size,
            } => write!(f, "line size {line_size} does not evenly divide {field} {cache_size}"),
            GeometryAdvisory::AccessTimeOutsideRange { value } => write!(
                f,
                "access time {value} is outside {ADVISED_ACCESS_TIME_MIN}..={ADVISED_ACCESS_TIME_MAX} cycles"
            ),
        }
    }
}

/// Validate raw field strings into a [`SimulationConfig`].
///
/// Fields are checked in wire order and the first failure is returned.
/// The only filesystem access is the readability check on the access
/// sequence file.
pub fn validate(raw: &RawFields) -> Result<SimulationConfig, ValidationError> {
    let instruction_cache_size = parse_positive(raw, Field::InstructionCacheSize)?;
    let data_cache_size = parse_positive(raw, Field::DataCacheSize)?;
    let line_size = parse_positive(raw, Field::LineSize)?;
    let access_time_cycles = parse_positive(raw, Field::AccessTimeCycles)?;
    let access_sequence = check_access_sequence(raw)?;

    Ok(SimulationConfig {
        instruction_cache_size,
        data_cache_size,
        line_size,
        access_time_cycles,
        access_sequence,
    })
}

fn parse_positive(raw: &RawFields, field: Field) -> Result<u64, ValidationError> {
    let text = raw.get(field.key()).map(|s| s.trim()).unwrap_or("");

    let value: i64 = text.parse().map_err(|e: std::num::ParseIntError| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => ValidationError::OutOfRange(field),
        _ => ValidationError::NotNumeric(field),
    })?;

    if value <= 0 {
        return Err(ValidationError::OutOfRange(field));
    }

    // value > 0, so the conversion cannot fail.
    u64::try_from(value).map_err(|_| ValidationError::OutOfRange(field))
}

fn check_access_sequence(raw: &RawFields) -> Result<String, ValidationError> {
    let text = raw
        .get(Field::AccessSequencePath.key())
        .map(String::as_str)
        .unwrap_or("");

    if text.is_empty() {
        return Err(ValidationError::FileNotFound(PathBuf::new()));
    }
    if text.contains(['\n', '\r']) {
        return Err(ValidationError::InvalidPath(PathBuf::from(text)));
    }

    let path = Path::new(text);
    let readable = path.is_file() && std::fs::File::open(path).is_ok();
    if !readable {
        return Err(ValidationError::FileNotFound(path.to_path_buf()));
    }

    Ok(text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(trace: &Path) -> RawFields {
        RawFields::from([
            ("instruction_cache_size".to_string(), "4096".to_string()),
            ("data_cache_size".to_string(), "4096".to_string()),
            ("line_size".to_string(), "16".to_string()),
            ("access_time_cycles".to_string(), "5".to_string()),
            (
                "access_sequence_path".to_string(),
                trace.to_string_lossy().into_owned(),
            ),
        ])
    }

    fn trace_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "0000 0000 0000 0000 0000 0000 0000 0000 I\n").unwrap();
        file
    }

    #[test]
    fn valid_fields_produce_config() {
        let trace = trace_file();
        let config = validate(&fields(trace.path())).expect("fields should validate");

        assert_eq!(config.instruction_cache_size(), 4096);
        assert_eq!(config.data_cache_size(), 4096);
        assert_eq!(config.line_size(), 16);
        assert_eq!(config.access_time_cycles(), 5);
        assert_eq!(config.access_sequence_path(), trace.path());
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let trace = trace_file();
        let mut raw = fields(trace.path());
        raw.insert("line_size".into(), "  32 ".into());

        let config = validate(&raw).unwrap();
        assert_eq!(config.line_size(), 32);
    }

    #[test]
    fn each_numeric_field_reports_not_numeric() {
        let trace = trace_file();
        for field in &Field::ALL[..4] {
            for bad in ["abc", "", "4k", "1.5", "0x10"] {
                let mut raw = fields(trace.path());
                raw.insert(field.key().into(), bad.into());
                assert_eq!(
                    validate(&raw),
                    Err(ValidationError::NotNumeric(*field)),
                    "input {bad:?} in {field:?}"
                );
            }
        }
    }

    #[test]
    fn missing_numeric_field_is_not_numeric() {
        let trace = trace_file();
        let mut raw = fields(trace.path());
        raw.remove("data_cache_size");
        assert_eq!(
            validate(&raw),
            Err(ValidationError::NotNumeric(Field::DataCacheSize))
        );
    }

    #[test]
    fn zero_and_negative_are_out_of_range() {
        let trace = trace_file();
        for bad in ["0", "-1", "-4096", "99999999999999999999"] {
            let mut raw = fields(trace.path());
            raw.insert("access_time_cycles".into(), bad.into());
            assert_eq!(
                validate(&raw),
                Err(ValidationError::OutOfRange(Field::AccessTimeCycles)),
                "input {bad:?}"
            );
        }
    }

    #[test]
    fn first_failing_field_in_wire_order_wins() {
        let trace = trace_file();
        let mut raw = fields(trace.path());
        raw.insert("line_size".into(), "x".into());
        raw.insert("instruction_cache_size".into(), "0".into());
        assert_eq!(
            validate(&raw),
            Err(ValidationError::OutOfRange(Field::InstructionCacheSize))
        );
    }

    #[test]
    fn nonexistent_path_is_file_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.txt");
        let err = validate(&fields(&missing)).unwrap_err();
        assert_eq!(err, ValidationError::FileNotFound(missing));
        assert_eq!(err.field(), Field::AccessSequencePath);
    }

    #[test]
    fn empty_path_is_file_not_found() {
        let trace = trace_file();
        let mut raw = fields(trace.path());
        raw.insert("access_sequence_path".into(), String::new());
        assert!(matches!(validate(&raw), Err(ValidationError::FileNotFound(_))));
    }

    #[test]
    fn directory_is_not_an_access_sequence() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate(&fields(tmp.path())),
            Err(ValidationError::FileNotFound(_))
        ));
    }

    #[test]
    fn path_with_newline_is_rejected() {
        let trace = trace_file();
        let mut raw = fields(trace.path());
        raw.insert("access_sequence_path".into(), "trace.txt\n4096".into());
        assert!(matches!(validate(&raw), Err(ValidationError::InvalidPath(_))));
    }

    #[test]
    fn error_messages_name_the_field() {
        let msg = ValidationError::NotNumeric(Field::LineSize).to_string();
        assert!(msg.contains("cache line size"), "unexpected message: {msg}");
    }

    #[test]
    fn power_of_two_geometry_has_no_advisories() {
        let trace = trace_file();
        let config = validate(&fields(trace.path())).unwrap();
        assert!(config.geometry_advisories().is_empty());
    }

    #[test]
    fn odd_geometry_is_advised_not_rejected() {
        let trace = trace_file();
        let mut raw = fields(trace.path());
        raw.insert("data_cache_size".into(), "3000".into());
        raw.insert("line_size".into(), "12".into());
        raw.insert("access_time_cycles".into(), "20".into());

        let config = validate(&raw).expect("geometry is not a validation concern");
        let advisories = config.geometry_advisories();

        assert!(advisories.contains(&GeometryAdvisory::NotPowerOfTwo {
            field: Field::DataCacheSize,
            value: 3000,
        }));
        assert!(advisories.contains(&GeometryAdvisory::LineDoesNotDivide {
            field: Field::InstructionCacheSize,
            line_size: 12,
            cache_size: 4096,
        }));
        assert!(advisories.contains(&GeometryAdvisory::AccessTimeOutsideRange { value: 20 }));
    }

    #[test]
    fn line_larger_than_cache_is_advised() {
        let trace = trace_file();
        let mut raw = fields(trace.path());
        raw.insert("line_size".into(), "8192".into());

        let config = validate(&raw).unwrap();
        assert!(config
            .geometry_advisories()
            .iter()
            .any(|a| matches!(a, GeometryAdvisory::LineExceedsCache { .. })));
    }
}
