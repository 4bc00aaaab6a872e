//! The test matrix: cases (feature sets + expectations) crossed with build variants.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::exit_code::PlatformInfo;

/// Link-time optimization setting appended to the release profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LtoMode {
    /// Leave the workspace profile untouched.
    None,
    Off,
    Thin,
    Fat,
}

impl LtoMode {
    /// Value written as `lto = "<value>"`, or `None` when no directive is appended.
    #[must_use]
    pub const fn directive(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Off => Some("off"),
            Self::Thin => Some("thin"),
            Self::Fat => Some("fat"),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Off => "off",
            Self::Thin => "thin",
            Self::Fat => "fat",
        }
    }
}

/// One build configuration of the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildVariant {
    Debug,
    Release(LtoMode),
}

impl BuildVariant {
    /// Iteration order for every case.
    pub const ALL: [Self; 5] = [
        Self::Debug,
        Self::Release(LtoMode::None),
        Self::Release(LtoMode::Off),
        Self::Release(LtoMode::Thin),
        Self::Release(LtoMode::Fat),
    ];

    #[must_use]
    pub const fn is_release(self) -> bool {
        matches!(self, Self::Release(_))
    }

    #[must_use]
    pub const fn lto(self) -> LtoMode {
        match self {
            Self::Debug => LtoMode::None,
            Self::Release(mode) => mode,
        }
    }

    /// Directory name cargo places artifacts of this profile in.
    #[must_use]
    pub const fn profile_dir(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release(_) => "release",
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => f.write_str("debug"),
            Self::Release(LtoMode::None) => f.write_str("release"),
            Self::Release(mode) => write!(f, "release+lto={}", mode.as_str()),
        }
    }
}

/// One row of the matrix: what to enable and what the subject must produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Stable identifier used in logs and reports.
    pub id: String,
    pub features: BTreeSet<String>,
    /// Normalized exit code (see [`crate::exit_code::normalize`]).
    pub expected_exit_code: i32,
    /// Etalon for stdout, relative to the subject directory. `None` expects no output.
    pub expected_stdout: Option<PathBuf>,
    /// Etalon for stderr, relative to the subject directory. `None` expects no output.
    pub expected_stderr: Option<PathBuf>,
}

impl TestCase {
    #[must_use]
    pub fn new(id: impl Into<String>, expected_exit_code: i32) -> Self {
        Self {
            id: id.into(),
            features: BTreeSet::new(),
            expected_exit_code,
            expected_stdout: None,
            expected_stderr: None,
        }
    }

    #[must_use]
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_stdout(mut self, etalon: impl AsRef<Path>) -> Self {
        self.expected_stdout = Some(etalon.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, etalon: impl AsRef<Path>) -> Self {
        self.expected_stderr = Some(etalon.as_ref().to_path_buf());
        self
    }

    /// Comma-joined feature list for `--features=`, or `None` when empty.
    #[must_use]
    pub fn feature_list(&self) -> Option<String> {
        if self.features.is_empty() {
            return None;
        }
        Some(
            self.features
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

pub const FEATURE_DEBUG_TYPE_NAME: &str = "debug_type_name";
pub const FEATURE_UNSAFE_REMOVE_DUPLICATE_CHECKS: &str = "unsafe_remove_duplicate_checks";

/// The checked-in matrix for the duplicate type id subject.
///
/// Without `unsafe_remove_duplicate_checks` the subject must abort before `main` and
/// report the collision on stderr; with it, `main` runs and reports what it saw.
#[must_use]
pub fn default_matrix(platform: &PlatformInfo) -> Vec<TestCase> {
    let abort = platform.abort_exit_code;
    vec![
        TestCase::new("auto_no_names", abort).with_stderr("etalons/auto_no_names.txt"),
        TestCase::new("auto_with_names", abort)
            .with_features([FEATURE_DEBUG_TYPE_NAME])
            .with_stderr("etalons/auto_with_names.txt"),
        TestCase::new("manual_no_names", 0)
            .with_features([FEATURE_UNSAFE_REMOVE_DUPLICATE_CHECKS])
            .with_stdout("etalons/m_stdout_no_names.txt")
            .with_stderr("etalons/m_stderr.txt"),
        TestCase::new("manual_with_names", 0)
            .with_features([
                FEATURE_UNSAFE_REMOVE_DUPLICATE_CHECKS,
                FEATURE_DEBUG_TYPE_NAME,
            ])
            .with_stdout("etalons/m_stdout_with_names.txt")
            .with_stderr("etalons/m_stderr.txt"),
    ]
}

/// Every (case, variant) cell in run order.
pub fn cells(cases: &[TestCase]) -> impl Iterator<Item = (&TestCase, BuildVariant)> {
    cases
        .iter()
        .flat_map(|case| BuildVariant::ALL.into_iter().map(move |v| (case, v)))
}
