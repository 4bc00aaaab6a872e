//! Observation vs expectation checks and per-cell results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diff::{escape_bytes, render_diff};

/// Which observable of the subject differed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ExitCode,
    Stdout,
    Stderr,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExitCode => "return code",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// A failed check, with both values rendered for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub case: String,
    pub variant: String,
    pub field: Field,
    pub observed: String,
    pub expected: String,
    /// Line diff for stream mismatches.
    pub diff: Option<String>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} doesn't match for case `{}` ({}): observed {} != expected {}",
            self.field, self.case, self.variant, self.observed, self.expected
        )?;
        if let Some(diff) = &self.diff {
            write!(f, "\n{diff}")?;
        }
        Ok(())
    }
}

/// What one run of the subject produced, exit code already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// What one cell requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Check exit code, then stdout, then stderr; the first difference wins.
pub fn compare(
    case: &str,
    variant: &str,
    observed: &Observation,
    expected: &Expectation,
) -> Result<(), Mismatch> {
    let mismatch = |field, observed: String, expected: String, diff| Mismatch {
        case: case.to_owned(),
        variant: variant.to_owned(),
        field,
        observed,
        expected,
        diff,
    };

    if observed.exit_code != expected.exit_code {
        return Err(mismatch(
            Field::ExitCode,
            observed.exit_code.to_string(),
            expected.exit_code.to_string(),
            None,
        ));
    }
    for (field, seen, want) in [
        (Field::Stdout, &observed.stdout, &expected.stdout),
        (Field::Stderr, &observed.stderr, &expected.stderr),
    ] {
        if seen != want {
            return Err(mismatch(
                field,
                escape_bytes(seen),
                escape_bytes(want),
                Some(render_diff(want, seen)),
            ));
        }
    }
    Ok(())
}

/// Outcome of one (case, variant) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellResult {
    pub case: String,
    pub variant: String,
    pub features: Vec<String>,
    pub passed: bool,
    /// Normalized exit code, when the subject ran.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    /// Failure message when the cell did not pass.
    pub failure: Option<String>,
}

/// Aggregate over the cells that ran before the run finished or stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub cells: Vec<CellResult>,
}

impl RunSummary {
    #[must_use]
    pub fn from_cells(cells: Vec<CellResult>, elapsed_ms: u64) -> Self {
        let total = cells.len();
        let passed = cells.iter().filter(|c| c.passed).count();
        Self {
            total,
            passed,
            failed: total - passed,
            elapsed_ms,
            cells,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expectation(exit_code: i32, stdout: &[u8], stderr: &[u8]) -> Expectation {
        Expectation {
            exit_code,
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
        }
    }

    fn observation(exit_code: i32, stdout: &[u8], stderr: &[u8]) -> Observation {
        Observation {
            exit_code,
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
        }
    }

    #[test]
    fn matching_cell_passes() {
        let exp = expectation(-6, b"", b"Detected error\n");
        let obs = observation(-6, b"", b"Detected error\n");
        assert!(compare("auto_no_names", "debug", &obs, &exp).is_ok());
    }

    #[test]
    fn exit_code_is_checked_first() {
        let exp = expectation(0, b"x", b"");
        let obs = observation(-6, b"y", b"");
        let m = compare("c", "debug", &obs, &exp).unwrap_err();
        assert_eq!(m.field, Field::ExitCode);
        assert_eq!(m.observed, "-6");
        assert_eq!(m.expected, "0");
        assert_eq!(
            m.to_string(),
            "return code doesn't match for case `c` (debug): observed -6 != expected 0"
        );
    }

    #[test]
    fn unexpected_stdout_fails_when_none_expected() {
        let exp = expectation(0, b"", b"");
        let obs = observation(0, b"noise\n", b"");
        let m = compare("c", "release", &obs, &exp).unwrap_err();
        assert_eq!(m.field, Field::Stdout);
        assert_eq!(m.observed, "b\"noise\\n\"");
        assert_eq!(m.expected, "b\"\"");
        assert!(m.diff.as_deref().unwrap().contains("+noise"));
    }

    #[test]
    fn single_byte_stderr_change_names_stderr() {
        let exp = expectation(0, b"ok\n", b"warn: 1\n");
        let obs = observation(0, b"ok\n", b"warn: 2\n");
        let m = compare("c", "release+lto=fat", &obs, &exp).unwrap_err();
        assert_eq!(m.field, Field::Stderr);
        assert!(m.to_string().starts_with("stderr doesn't match"));
    }

    #[test]
    fn summary_counts() {
        let cell = |passed| CellResult {
            case: String::from("c"),
            variant: String::from("debug"),
            features: Vec::new(),
            passed,
            exit_code: Some(0),
            duration_ms: 1,
            failure: None,
        };
        let summary = RunSummary::from_cells(vec![cell(true), cell(true), cell(false)], 10);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_passed());
    }
}
