//! Blocking subprocess execution behind a trait, so the driver can be exercised with a
//! scripted executor.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;

use crate::error::TestFailure;
use crate::exit_code::RawExit;

/// Environment variables a subprocess gets on top of the inherited environment.
///
/// Values are computed from an explicit base snapshot instead of mutating the
/// harness process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvOverrides {
    vars: BTreeMap<String, String>,
}

impl EnvOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Append `suffix` to `key`. The first append starts from `base` (the value the
    /// variable had in the harness environment); later appends extend the override.
    pub fn append(&mut self, key: &str, base: Option<&str>, suffix: &str) -> &mut Self {
        let mut value = self
            .vars
            .get(key)
            .cloned()
            .or_else(|| base.map(str::to_owned))
            .unwrap_or_default();
        value.push_str(suffix);
        self.vars.insert(key.to_owned(), value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// A fully described subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: EnvOverrides,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: EnvOverrides::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn envs(mut self, env: &EnvOverrides) -> Self {
        self.env = env.clone();
        self
    }

    /// Program name as text (lossy for non-UTF-8 paths).
    #[must_use]
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Shell-like rendering for logs and error messages.
    #[must_use]
    pub fn display(&self) -> String {
        let mut out = self.program_name();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// What to do with the child's stdout/stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream straight to the harness terminal (build tool output).
    Inherit,
    /// Collect both streams as bytes.
    Capture,
}

/// Termination status plus captured streams of one subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub raw: RawExit,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.raw == RawExit::Code(0)
    }
}

/// Runs a subprocess to completion.
pub trait Executor {
    fn execute(&self, spec: &CommandSpec, mode: OutputMode) -> Result<ProcessOutput, TestFailure>;
}

/// Executor backed by `std::process::Command`. Stdin is always null.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execute(&self, spec: &CommandSpec, mode: OutputMode) -> Result<ProcessOutput, TestFailure> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in spec.env.iter() {
            cmd.env(key, value);
        }

        let spawn_err = |source| TestFailure::Spawn {
            program: spec.program_name(),
            source,
        };
        match mode {
            OutputMode::Inherit => {
                let status = cmd.status().map_err(spawn_err)?;
                Ok(ProcessOutput {
                    raw: RawExit::from_status(status),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                })
            }
            OutputMode::Capture => {
                let output = cmd.output().map_err(spawn_err)?;
                Ok(ProcessOutput {
                    raw: RawExit::from_status(output.status),
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_extends_base_then_override() {
        let mut env = EnvOverrides::new();
        env.append("RUSTFLAGS", Some("-Copt-level=1"), " -Zsanitizer=address");
        env.append("RUSTFLAGS", Some("ignored"), " -L/x");
        assert_eq!(
            env.get("RUSTFLAGS"),
            Some("-Copt-level=1 -Zsanitizer=address -L/x")
        );
    }

    #[test]
    fn append_without_base_starts_empty() {
        let mut env = EnvOverrides::new();
        env.append("PATH", None, ";C:/llvm;");
        assert_eq!(env.get("PATH"), Some(";C:/llvm;"));
        assert!(!env.is_empty());
    }

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("cargo").args(["build", "--release"]);
        assert_eq!(spec.display(), "cargo build --release");
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_captures_streams_and_code() {
        let spec = CommandSpec::new("sh").args(["-c", "printf out; printf err >&2; exit 3"]);
        let out = SystemExecutor
            .execute(&spec, OutputMode::Capture)
            .expect("sh should spawn");
        assert_eq!(out.raw, RawExit::Code(3));
        assert_eq!(out.stdout, b"out");
        assert_eq!(out.stderr, b"err");
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_reports_abort_as_signal() {
        let spec = CommandSpec::new("sh").args(["-c", "kill -ABRT $$"]);
        let out = SystemExecutor
            .execute(&spec, OutputMode::Capture)
            .expect("sh should spawn");
        assert_eq!(out.raw, RawExit::Signal(libc::SIGABRT));
        assert_eq!(
            crate::exit_code::normalize(out.raw, crate::exit_code::PlatformFamily::Signal),
            -6
        );
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_applies_env_overrides() {
        let mut env = EnvOverrides::new();
        env.set("MATRIX_HARNESS_MARKER", "42");
        let spec = CommandSpec::new("sh")
            .args(["-c", "printf %s \"$MATRIX_HARNESS_MARKER\""])
            .envs(&env);
        let out = SystemExecutor
            .execute(&spec, OutputMode::Capture)
            .expect("sh should spawn");
        assert_eq!(out.stdout, b"42");
        assert!(out.success());
    }

    #[test]
    fn missing_program_is_a_spawn_failure() {
        let spec = CommandSpec::new("matrix-harness-no-such-program");
        let err = SystemExecutor
            .execute(&spec, OutputMode::Capture)
            .expect_err("spawn should fail");
        assert!(matches!(err, TestFailure::Spawn { .. }), "{err}");
    }
}
