//! CLI entrypoint for the build-matrix etalon harness.

use std::process::ExitCode;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;

use matrix_harness::config::{DriverConfig, RunOptions};
use matrix_harness::exec::SystemExecutor;
use matrix_harness::matrix::default_matrix;
use matrix_harness::structured_log::LogEmitter;
use matrix_harness::toolchain::RustupResolver;
use matrix_harness::{Driver, RunReport};

/// Builds the subject binary across feature sets and debug/release/LTO variants,
/// runs it, and compares exit code, stdout and stderr against etalon files.
///
/// Directories and output paths come from `MATRIX_HARNESS_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "matrix-harness")]
#[command(about = "Build-matrix etalon tests for the subject binary")]
struct Cli {
    /// Build with AddressSanitizer (`-Zsanitizer=address`, `-Zbuild-std`).
    #[arg(long)]
    use_asan: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("matrix-harness: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Run the default matrix. `Ok(false)` means a cell failed and has been reported.
fn run(cli: &Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let started = Instant::now();

    let executor = SystemExecutor;
    let resolver = RustupResolver::new(&executor);
    let options = RunOptions {
        use_asan: cli.use_asan,
    };
    let config = DriverConfig::from_env(options, &resolver)?;

    let run_id = format!(
        "run-{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    );
    let mut log = match &config.log_path {
        Some(path) => LogEmitter::to_file(path, &run_id)?,
        None => LogEmitter::to_stderr(&run_id),
    };

    let cases = default_matrix(&config.platform);
    let mut driver = Driver::new(&config, &executor, &mut log);
    let outcome = driver.run(&cases);
    let summary = driver.summary();

    if let Some(path) = &config.report_path {
        let failure = outcome.as_ref().err().map(ToString::to_string);
        let report = RunReport::new(&config, summary.clone(), failure)
            .with_etalons(&config.subject_dir, &cases);
        if let Some(err) = &report.etalon_error {
            eprintln!("Etalons left out of the report: {err}");
        }
        report.write(path)?;
        eprintln!("Report written to {}", path.display());
    }
    log.flush()?;

    println!(
        "Running tests took {:.3} seconds",
        started.elapsed().as_secs_f64()
    );

    if let Err(err) = outcome {
        eprintln!("{err}");
        eprintln!(
            "{} of {} cells passed before the failure",
            summary.passed, summary.total
        );
        return Ok(false);
    }
    eprintln!("All {} cells passed", summary.total);
    Ok(true)
}
