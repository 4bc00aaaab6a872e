//! Failure taxonomy for a matrix run.
//!
//! Every variant is fatal: the driver stops at the first one it sees.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::verify::Mismatch;

/// Coarse failure category, used in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Build,
    Mismatch,
    Setup,
}

/// Why a matrix run stopped.
#[derive(Debug, Error)]
pub enum TestFailure {
    /// The build tool exited non-zero.
    #[error("build failed for case `{case}` ({variant}): `{command}` exited with {status}")]
    BuildFailed {
        case: String,
        variant: String,
        command: String,
        status: String,
    },
    /// Observed exit code or output stream differs from the expectation.
    #[error("{0}")]
    Mismatch(Box<Mismatch>),
    /// A subprocess could not be started at all.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A backup of the build configuration file is already present.
    ///
    /// Usually left behind by an interrupted run; the backup is the pristine copy.
    #[error(
        "stale backup {} exists; restore it over {} before running again",
        backup.display(),
        manifest.display()
    )]
    StaleBackup { manifest: PathBuf, backup: PathBuf },
    #[error("toolchain resolution failed: {0}")]
    Toolchain(String),
    #[error("failed to find address sanitizer libraries (searched: {})", display_paths(searched))]
    SanitizerRuntimeNotFound { searched: Vec<PathBuf> },
    #[error("structured log write failed: {0}")]
    Log(#[source] std::io::Error),
}

impl TestFailure {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::BuildFailed { .. } => FailureKind::Build,
            Self::Mismatch(_) => FailureKind::Mismatch,
            Self::Spawn { .. }
            | Self::Io { .. }
            | Self::StaleBackup { .. }
            | Self::Toolchain(_)
            | Self::SanitizerRuntimeNotFound { .. }
            | Self::Log(_) => FailureKind::Setup,
        }
    }
}

impl From<Mismatch> for TestFailure {
    fn from(mismatch: Mismatch) -> Self {
        Self::Mismatch(Box::new(mismatch))
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
