//! Header derivation and record-to-row shaping.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use recon_core::error::CoreError;
use recon_core::types::Record;

use crate::error::SinkError;

/// How a record whose fields differ from the established header is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaPolicy {
    /// Reject the append with [`SinkError::SchemaMismatch`].
    #[default]
    Strict,
    /// Write missing fields as empty and drop unexpected ones.
    Lenient,
}

impl FromStr for SchemaPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SchemaPolicy::Strict),
            "lenient" => Ok(SchemaPolicy::Lenient),
            other => Err(CoreError::Validation(format!(
                "Unknown sink schema policy '{other}' (expected 'strict' or 'lenient')"
            ))),
        }
    }
}

/// Keys that are empty or whitespace-only are never written.
pub(crate) fn is_writable_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Column order taken from a record's own keys.
pub(crate) fn header_from_record(record: &Record) -> Vec<String> {
    record
        .keys()
        .filter(|k| is_writable_key(k))
        .map(str::to_string)
        .collect()
}

/// Lay `record` out in `header` order according to `policy`.
pub(crate) fn shape_row(
    record: &Record,
    header: &[String],
    policy: SchemaPolicy,
    path: &Path,
) -> Result<Vec<String>, SinkError> {
    if policy == SchemaPolicy::Strict {
        check_fields(record, header, path)?;
    }
    Ok(header
        .iter()
        .map(|column| {
            record
                .field(column)
                .map(|f| f.into_owned())
                .unwrap_or_default()
        })
        .collect())
}

fn check_fields(record: &Record, header: &[String], path: &Path) -> Result<(), SinkError> {
    let expected: HashSet<&str> = header.iter().map(String::as_str).collect();
    let actual: HashSet<&str> = record.keys().filter(|k| is_writable_key(k)).collect();

    if expected == actual {
        return Ok(());
    }

    let mut missing: Vec<String> = header
        .iter()
        .filter(|h| !actual.contains(h.as_str()))
        .cloned()
        .collect();
    let mut unexpected: Vec<String> = record
        .keys()
        .filter(|k| is_writable_key(k) && !expected.contains(k))
        .map(str::to_string)
        .collect();
    missing.sort();
    unexpected.sort();

    Err(SinkError::SchemaMismatch {
        path: path.to_path_buf(),
        missing,
        unexpected,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Strict".parse::<SchemaPolicy>().unwrap(), SchemaPolicy::Strict);
        assert_eq!(" lenient ".parse::<SchemaPolicy>().unwrap(), SchemaPolicy::Lenient);
        assert!("loose".parse::<SchemaPolicy>().is_err());
    }

    #[test]
    fn header_skips_blank_keys() {
        let rec = Record::new().with("a", 1i64).with(" ", "x").with("b", 2i64);
        assert_eq!(header_from_record(&rec), header(&["a", "b"]));
    }

    #[test]
    fn strict_shapes_reordered_record() {
        let rec = Record::new().with("b", "2").with("a", "1");
        let row = shape_row(&rec, &header(&["a", "b"]), SchemaPolicy::Strict, Path::new("x.csv")).unwrap();
        assert_eq!(row, vec!["1", "2"]);
    }

    #[test]
    fn strict_rejects_missing_and_extra_fields() {
        let rec = Record::new().with("a", "1").with("c", "3");
        let err = shape_row(&rec, &header(&["a", "b"]), SchemaPolicy::Strict, Path::new("x.csv"))
            .unwrap_err();
        assert_matches!(
            err,
            SinkError::SchemaMismatch { ref missing, ref unexpected, .. }
                if missing == &vec!["b".to_string()] && unexpected == &vec!["c".to_string()]
        );
    }

    #[test]
    fn lenient_blanks_missing_and_drops_extra() {
        let rec = Record::new().with("a", "1").with("c", "3");
        let row = shape_row(&rec, &header(&["a", "b"]), SchemaPolicy::Lenient, Path::new("x.csv")).unwrap();
        assert_eq!(row, vec!["1", ""]);
    }

    #[test]
    fn blank_keys_do_not_count_as_unexpected() {
        let rec = Record::new().with("a", "1").with("", "junk");
        let row = shape_row(&rec, &header(&["a"]), SchemaPolicy::Strict, Path::new("x.csv")).unwrap();
        assert_eq!(row, vec!["1"]);
    }
}
