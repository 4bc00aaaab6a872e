//! Platform-dependent exit-code interpretation.
//!
//! Unix reports abnormal termination as a signal number with no exit code; the harness
//! folds that into a single integer (`-signal`) so expectations can be written as one
//! number per platform family. Windows reports a plain status integer and is compared
//! literally.

use std::process::ExitStatus;

use serde::{Deserialize, Serialize};

#[cfg(unix)]
const SIGABRT: i32 = libc::SIGABRT;
#[cfg(not(unix))]
const SIGABRT: i32 = 6;

/// Exit code an aborting subject reports on status-code platforms.
const STATUS_CODE_ABORT: i32 = 2;

/// How a platform reports process termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformFamily {
    /// Abnormal termination is reported as a signal number (unix).
    Signal,
    /// Termination is always a plain status integer (windows).
    StatusCode,
}

/// Termination status as reported by the OS, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RawExit {
    Code(i32),
    Signal(i32),
}

impl RawExit {
    /// Decode a std exit status.
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }
        // Neither a code nor a signal only happens for stopped/continued children,
        // which a blocking wait never returns.
        Self::Code(status.code().unwrap_or(-1))
    }
}

impl std::fmt::Display for RawExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signal(signal) => write!(f, "signal {signal}"),
        }
    }
}

/// Fold a raw termination status into the comparable integer for `family`.
#[must_use]
pub const fn normalize(raw: RawExit, family: PlatformFamily) -> i32 {
    match (raw, family) {
        (RawExit::Code(code), _) => code,
        (RawExit::Signal(signal), PlatformFamily::Signal) => -signal,
        // Status-code platforms have no signals; keep the number untouched.
        (RawExit::Signal(signal), PlatformFamily::StatusCode) => signal,
    }
}

/// Facts about the host that shape expectations and paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub family: PlatformFamily,
    /// Normalized exit code of a subject that aborts.
    pub abort_exit_code: i32,
    /// Suffix of produced executables (`""` or `".exe"`).
    pub exe_suffix: String,
}

impl PlatformInfo {
    #[must_use]
    pub fn signal_based() -> Self {
        Self {
            family: PlatformFamily::Signal,
            abort_exit_code: -SIGABRT,
            exe_suffix: String::new(),
        }
    }

    #[must_use]
    pub fn status_code_based() -> Self {
        Self {
            family: PlatformFamily::StatusCode,
            abort_exit_code: STATUS_CODE_ABORT,
            exe_suffix: String::from(".exe"),
        }
    }

    /// Description of the platform this binary was compiled for.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::status_code_based()
        } else {
            Self::signal_based()
        }
    }
}
