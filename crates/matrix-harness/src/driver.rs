//! Build-matrix driver.
//!
//! Cells run strictly in order: mutate the manifest (LTO variants only), build, run the
//! subject, compare, restore. The first failure of any kind ends the run; nothing is
//! retried.

use std::time::{Duration, Instant};

use serde_json::json;

use crate::config::DriverConfig;
use crate::error::TestFailure;
use crate::etalon;
use crate::exec::{Executor, OutputMode};
use crate::exit_code::normalize;
use crate::invocation;
use crate::manifest_guard::ManifestGuard;
use crate::matrix::{self, BuildVariant, TestCase};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
use crate::verify::{self, CellResult, Expectation, Observation, RunSummary};

/// Runs a test matrix against one configuration.
pub struct Driver<'a, E: Executor> {
    config: &'a DriverConfig,
    executor: &'a E,
    log: &'a mut LogEmitter,
    cells: Vec<CellResult>,
    started: Option<Instant>,
}

impl<'a, E: Executor> Driver<'a, E> {
    #[must_use]
    pub fn new(config: &'a DriverConfig, executor: &'a E, log: &'a mut LogEmitter) -> Self {
        Self {
            config,
            executor,
            log,
            cells: Vec::new(),
            started: None,
        }
    }

    /// Run every (case, variant) cell, stopping at the first failure.
    pub fn run(&mut self, cases: &[TestCase]) -> Result<RunSummary, TestFailure> {
        self.started = Some(Instant::now());
        self.cells.clear();

        let entry = self
            .log
            .entry(LogLevel::Info, "run_start")
            .with_details(json!({
                "cases": cases.len(),
                "variants": BuildVariant::ALL.len(),
                "sanitizer": self.config.sanitizer,
                "target_triple": self.config.target_triple,
                "manifest": self.config.manifest_path.display().to_string(),
            }));
        self.emit(&entry)?;

        for (case, variant) in matrix::cells(cases) {
            self.run_cell(case, variant)?;
        }

        let summary = self.summary();
        let entry = self
            .log
            .entry(LogLevel::Info, "run_complete")
            .with_outcome(Outcome::Pass)
            .with_duration_ms(summary.elapsed_ms)
            .with_details(json!({ "total": summary.total, "passed": summary.passed }));
        self.emit(&entry)?;
        Ok(summary)
    }

    /// Cells run so far. After a failed run the last cell is the failing one.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let elapsed_ms = self.started.map_or(0, |s| millis(s.elapsed()));
        RunSummary::from_cells(self.cells.clone(), elapsed_ms)
    }

    fn run_cell(&mut self, case: &TestCase, variant: BuildVariant) -> Result<(), TestFailure> {
        let started = Instant::now();
        let label = variant.to_string();
        let mut observed = None;
        let outcome = self.execute_cell(case, variant, &label, &mut observed);
        let duration_ms = millis(started.elapsed());

        self.cells.push(CellResult {
            case: case.id.clone(),
            variant: label.clone(),
            features: features(case),
            passed: outcome.is_ok(),
            exit_code: observed,
            duration_ms,
            failure: outcome.as_ref().err().map(ToString::to_string),
        });

        let entry = match &outcome {
            Ok(()) => self
                .log
                .entry(LogLevel::Info, "cell_pass")
                .with_outcome(Outcome::Pass),
            Err(err) => self
                .log
                .entry(LogLevel::Error, "cell_fail")
                .with_outcome(Outcome::Fail)
                .with_details(json!({ "kind": err.kind(), "message": err.to_string() })),
        };
        let mut entry = entry
            .with_cell(&case.id, &label)
            .with_features(features(case))
            .with_duration_ms(duration_ms);
        entry.exit_code = observed;
        let logged = self.emit(&entry);

        outcome.and(logged)
    }

    fn execute_cell(
        &mut self,
        case: &TestCase,
        variant: BuildVariant,
        label: &str,
        observed: &mut Option<i32>,
    ) -> Result<(), TestFailure> {
        let root = &self.config.subject_dir;
        let expected = Expectation {
            exit_code: case.expected_exit_code,
            stdout: etalon::load_expected(root, case.expected_stdout.as_deref())?,
            stderr: etalon::load_expected(root, case.expected_stderr.as_deref())?,
        };

        let guard = ManifestGuard::apply_lto(&self.config.manifest_path, variant.lto())?;
        if let Some(guard) = &guard {
            let entry = self
                .log
                .entry(LogLevel::Info, "config_mutated")
                .with_cell(&case.id, label)
                .with_artifacts(vec![guard.manifest().display().to_string()])
                .with_details(json!({ "lto": variant.lto().as_str() }));
            self.emit(&entry)?;
        }

        let checked = self.build_and_check(case, variant, label, &expected, observed);

        let Some(guard) = guard else {
            return checked;
        };
        let restored = guard.restore();
        let level = if restored.is_ok() {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        let entry = self
            .log
            .entry(level, "config_restored")
            .with_cell(&case.id, label)
            .with_artifacts(vec![self.config.manifest_path.display().to_string()]);
        let logged = self.emit(&entry);

        checked.and(restored).and(logged)
    }

    fn build_and_check(
        &mut self,
        case: &TestCase,
        variant: BuildVariant,
        label: &str,
        expected: &Expectation,
        observed: &mut Option<i32>,
    ) -> Result<(), TestFailure> {
        let build = invocation::build_command(self.config, case, variant);
        let entry = self
            .log
            .entry(LogLevel::Info, "build_start")
            .with_cell(&case.id, label)
            .with_features(features(case))
            .with_command(build.display());
        self.emit(&entry)?;

        let started = Instant::now();
        let out = self.executor.execute(&build, OutputMode::Inherit)?;
        if !out.success() {
            return Err(TestFailure::BuildFailed {
                case: case.id.clone(),
                variant: label.to_owned(),
                command: build.display(),
                status: out.raw.to_string(),
            });
        }
        let entry = self
            .log
            .entry(LogLevel::Info, "build_done")
            .with_cell(&case.id, label)
            .with_exit_code(0)
            .with_duration_ms(millis(started.elapsed()));
        self.emit(&entry)?;

        let run = invocation::subject_command(self.config, variant);
        let out = self.executor.execute(&run, OutputMode::Capture)?;
        let exit_code = normalize(out.raw, self.config.platform.family);
        *observed = Some(exit_code);
        let entry = self
            .log
            .entry(LogLevel::Info, "subject_run")
            .with_cell(&case.id, label)
            .with_command(run.display())
            .with_exit_code(exit_code)
            .with_details(json!({
                "raw": out.raw.to_string(),
                "stdout_bytes": out.stdout.len(),
                "stderr_bytes": out.stderr.len(),
            }));
        self.emit(&entry)?;

        let observation = Observation {
            exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
        };
        verify::compare(&case.id, label, &observation, expected)?;
        Ok(())
    }

    fn emit(&mut self, entry: &LogEntry) -> Result<(), TestFailure> {
        self.log.emit_entry(entry).map_err(TestFailure::Log)
    }
}

fn features(case: &TestCase) -> Vec<String> {
    case.features.iter().cloned().collect()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
