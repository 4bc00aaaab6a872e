//! Build-matrix etalon harness.
//!
//! This crate provides:
//! - Matrix: test cases (feature sets + expected exit code/streams) crossed with
//!   debug/release/LTO build variants
//! - Driver: build, run and compare every cell, stopping at the first failure
//! - Manifest guard: scoped LTO directive in the workspace manifest, always restored
//! - Exit-code normalization across signal and status-code platforms
//! - Structured JSONL logging and JSON/markdown run reports

#![forbid(unsafe_code)]

pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod etalon;
pub mod exec;
pub mod exit_code;
pub mod invocation;
pub mod manifest_guard;
pub mod matrix;
pub mod report;
pub mod structured_log;
pub mod toolchain;
pub mod verify;

pub use config::{DriverConfig, RunOptions};
pub use driver::Driver;
pub use error::TestFailure;
pub use exec::{Executor, SystemExecutor};
pub use matrix::{BuildVariant, LtoMode, TestCase};
pub use report::RunReport;
pub use verify::RunSummary;
