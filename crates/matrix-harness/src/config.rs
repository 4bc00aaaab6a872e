//! Driver configuration.
//!
//! Everything environment-dependent is resolved here, once, before the first build:
//! - `MATRIX_HARNESS_SUBJECT_DIR`: directory holding `etalons/` and used as the build
//!   working directory (default: current directory).
//! - `MATRIX_HARNESS_WORKSPACE`: workspace whose `Cargo.toml` gets the LTO directive
//!   (default: parent of the subject directory).
//! - `CARGO_TARGET_DIR`: build output root (default: `<workspace>/target`).
//! - `MATRIX_HARNESS_LOG`: JSONL log file (default: JSONL on stderr).
//! - `MATRIX_HARNESS_REPORT`: JSON run report path (default: no report).
//! - `MATRIX_HARNESS_ASAN_ROOT`: clang lib root searched for the sanitizer runtime on
//!   status-code platforms, replacing the built-in candidates.
//!
//! `RUSTFLAGS` and `PATH` are read once and extended through [`EnvOverrides`]; the
//! harness never writes its own environment.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::TestFailure;
use crate::exec::EnvOverrides;
use crate::exit_code::{PlatformFamily, PlatformInfo};
use crate::toolchain::{DEFAULT_ASAN_ROOTS, ToolchainResolver, find_asan_runtime};

pub const ENV_SUBJECT_DIR: &str = "MATRIX_HARNESS_SUBJECT_DIR";
pub const ENV_WORKSPACE: &str = "MATRIX_HARNESS_WORKSPACE";
pub const ENV_TARGET_DIR: &str = "CARGO_TARGET_DIR";
pub const ENV_LOG: &str = "MATRIX_HARNESS_LOG";
pub const ENV_REPORT: &str = "MATRIX_HARNESS_REPORT";
pub const ENV_ASAN_ROOT: &str = "MATRIX_HARNESS_ASAN_ROOT";

/// Binary built and run for every cell.
pub const SUBJECT_BIN: &str = "duplicate_type_ids_handling";

const SANITIZER_RUSTFLAGS: &str = " -Zsanitizer=address";
const ASAN_DYLIB: &str = "clang_rt.asan_dynamic-x86_64";

/// Options from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Build with AddressSanitizer instrumentation.
    pub use_asan: bool,
}

/// Snapshot of the inherited variables the harness extends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseEnv {
    pub rustflags: Option<String>,
    pub path: Option<String>,
}

impl BaseEnv {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            rustflags: lookup("RUSTFLAGS"),
            path: lookup("PATH"),
        }
    }
}

/// Extra environment for sanitizer builds.
///
/// `runtime_dir` is the directory holding the dynamic sanitizer runtime; it is only
/// needed where the toolchain does not ship one (windows).
#[must_use]
pub fn sanitizer_overrides(base: &BaseEnv, runtime_dir: Option<&Path>) -> EnvOverrides {
    let mut env = EnvOverrides::new();
    env.append("RUSTFLAGS", base.rustflags.as_deref(), SANITIZER_RUSTFLAGS);
    if let Some(dir) = runtime_dir {
        let dir = dir.display();
        env.append(
            "RUSTFLAGS",
            None,
            &format!(" -l dylib={ASAN_DYLIB} -L{dir}"),
        );
        env.append("PATH", base.path.as_deref(), &format!(";{dir};"));
    }
    env
}

/// Resolved settings for one matrix run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverConfig {
    /// Etalon root and build working directory.
    pub subject_dir: PathBuf,
    pub workspace_root: PathBuf,
    /// Shared build configuration file mutated for LTO variants.
    pub manifest_path: PathBuf,
    pub target_dir: PathBuf,
    /// Build tool executable.
    pub cargo: String,
    pub bin_name: String,
    /// Workspace members skipped by `--workspace` builds.
    pub excluded_packages: Vec<String>,
    pub target_triple: Option<String>,
    pub sanitizer: bool,
    pub env: EnvOverrides,
    pub platform: PlatformInfo,
    pub log_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

impl DriverConfig {
    /// Defaults for a subject living in `subject_dir`, one level below its workspace.
    #[must_use]
    pub fn new(subject_dir: impl Into<PathBuf>, platform: PlatformInfo) -> Self {
        let subject_dir = subject_dir.into();
        let workspace_root = subject_dir
            .parent()
            .map_or_else(|| subject_dir.clone(), Path::to_path_buf);
        Self {
            manifest_path: workspace_root.join("Cargo.toml"),
            target_dir: workspace_root.join("target"),
            subject_dir,
            workspace_root,
            cargo: String::from("cargo"),
            bin_name: String::from(SUBJECT_BIN),
            excluded_packages: vec![String::from("benches")],
            target_triple: None,
            sanitizer: false,
            env: EnvOverrides::new(),
            platform,
            log_path: None,
            report_path: None,
        }
    }

    /// Point at a different workspace; manifest and target dir follow it.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self.manifest_path = self.workspace_root.join("Cargo.toml");
        self.target_dir = self.workspace_root.join("target");
        self
    }

    #[must_use]
    pub fn with_target_triple(mut self, triple: Option<String>) -> Self {
        self.target_triple = triple;
        self
    }

    /// Resolve from the process environment.
    pub fn from_env(
        options: RunOptions,
        resolver: &dyn ToolchainResolver,
    ) -> Result<Self, TestFailure> {
        let cwd = std::env::current_dir().map_err(|e| TestFailure::io(".", e))?;
        Self::from_lookup(&cwd, PlatformInfo::host(), options, resolver, |key| {
            std::env::var(key).ok()
        })
    }

    /// Resolve from an arbitrary variable source.
    pub fn from_lookup(
        cwd: &Path,
        platform: PlatformInfo,
        options: RunOptions,
        resolver: &dyn ToolchainResolver,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, TestFailure> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let subject_dir = non_empty(ENV_SUBJECT_DIR)
            .map_or_else(|| cwd.to_path_buf(), |dir| cwd.join(dir));
        let mut config = Self::new(subject_dir, platform);
        if let Some(root) = non_empty(ENV_WORKSPACE) {
            config = config.with_workspace_root(cwd.join(root));
        }
        if let Some(target) = non_empty(ENV_TARGET_DIR) {
            config.target_dir = cwd.join(target);
        }
        config.log_path = non_empty(ENV_LOG).map(|p| cwd.join(p));
        config.report_path = non_empty(ENV_REPORT).map(|p| cwd.join(p));

        config.target_triple = resolver.target_triple()?;

        if options.use_asan {
            let base = BaseEnv::from_lookup(&lookup);
            let runtime_dir = match config.platform.family {
                PlatformFamily::Signal => None,
                PlatformFamily::StatusCode => {
                    let roots: Vec<PathBuf> = match non_empty(ENV_ASAN_ROOT) {
                        Some(root) => vec![PathBuf::from(root)],
                        None => DEFAULT_ASAN_ROOTS.into_iter().map(PathBuf::from).collect(),
                    };
                    Some(find_asan_runtime(&roots)?)
                }
            };
            config.sanitizer = true;
            config.env = sanitizer_overrides(&base, runtime_dir.as_deref());
        }
        // Cargo runs in the subject dir and would resolve a relative value from there.
        if non_empty(ENV_TARGET_DIR).is_some() {
            config
                .env
                .set(ENV_TARGET_DIR, config.target_dir.display().to_string());
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::toolchain::FixedTriple;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_put_workspace_one_level_up() {
        let config = DriverConfig::new("/ws/extra_tests", PlatformInfo::signal_based());
        assert_eq!(config.workspace_root, PathBuf::from("/ws"));
        assert_eq!(config.manifest_path, PathBuf::from("/ws/Cargo.toml"));
        assert_eq!(config.target_dir, PathBuf::from("/ws/target"));
        assert_eq!(config.bin_name, SUBJECT_BIN);
        assert!(!config.sanitizer);
        assert!(config.env.is_empty());
    }

    #[test]
    fn lookup_overrides_directories_relative_to_cwd() {
        let cwd = Path::new("/home/dev");
        let config = DriverConfig::from_lookup(
            cwd,
            PlatformInfo::signal_based(),
            RunOptions::default(),
            &FixedTriple(Some(String::from("x86_64-unknown-linux-gnu"))),
            lookup_from(&[
                (ENV_SUBJECT_DIR, "repo/extra_tests"),
                (ENV_TARGET_DIR, "/tmp/target"),
                (ENV_LOG, "run.jsonl"),
                (ENV_REPORT, "  "),
            ]),
        )
        .unwrap();
        assert_eq!(
            config.subject_dir,
            PathBuf::from("/home/dev/repo/extra_tests")
        );
        assert_eq!(config.workspace_root, PathBuf::from("/home/dev/repo"));
        assert_eq!(config.target_dir, PathBuf::from("/tmp/target"));
        assert_eq!(config.log_path, Some(PathBuf::from("/home/dev/run.jsonl")));
        assert_eq!(config.report_path, None);
        assert_eq!(
            config.target_triple.as_deref(),
            Some("x86_64-unknown-linux-gnu")
        );
    }

    #[test]
    fn relative_target_dir_reaches_cargo_as_the_path_the_harness_runs_from() {
        let config = DriverConfig::from_lookup(
            Path::new("/home/dev/repo"),
            PlatformInfo::signal_based(),
            RunOptions { use_asan: true },
            &FixedTriple(None),
            lookup_from(&[(ENV_SUBJECT_DIR, "extra_tests"), (ENV_TARGET_DIR, "target")]),
        )
        .unwrap();
        assert_eq!(config.target_dir, PathBuf::from("/home/dev/repo/target"));
        let passed = config.env.get(ENV_TARGET_DIR).map(PathBuf::from);
        assert_eq!(passed.as_ref(), Some(&config.target_dir));
        assert!(config.env.get("RUSTFLAGS").is_some());

        let exe = crate::invocation::executable_path(&config, crate::matrix::BuildVariant::Debug);
        assert!(exe.starts_with(passed.unwrap()));
    }

    #[test]
    fn default_target_dir_is_left_to_cargo() {
        let config = DriverConfig::from_lookup(
            Path::new("/home/dev/repo"),
            PlatformInfo::signal_based(),
            RunOptions::default(),
            &FixedTriple(None),
            lookup_from(&[(ENV_SUBJECT_DIR, "extra_tests")]),
        )
        .unwrap();
        assert_eq!(config.target_dir, PathBuf::from("/home/dev/repo/target"));
        assert_eq!(config.env.get(ENV_TARGET_DIR), None);
    }

    #[test]
    fn sanitizer_extends_rustflags_without_replacing() {
        let config = DriverConfig::from_lookup(
            Path::new("/ws/sub"),
            PlatformInfo::signal_based(),
            RunOptions { use_asan: true },
            &FixedTriple(None),
            lookup_from(&[("RUSTFLAGS", "-Cdebuginfo=1"), ("PATH", "/usr/bin")]),
        )
        .unwrap();
        assert!(config.sanitizer);
        assert_eq!(
            config.env.get("RUSTFLAGS"),
            Some("-Cdebuginfo=1 -Zsanitizer=address")
        );
        assert_eq!(config.env.get("PATH"), None);
    }

    #[test]
    fn status_code_sanitizer_links_the_runtime_dir() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("19")).unwrap();
        let root_str = root.path().to_str().unwrap().to_string();
        let config = DriverConfig::from_lookup(
            Path::new("/ws/sub"),
            PlatformInfo::status_code_based(),
            RunOptions { use_asan: true },
            &FixedTriple(None),
            lookup_from(&[(ENV_ASAN_ROOT, root_str.as_str()), ("PATH", "C:/bin")]),
        )
        .unwrap();

        let dir = root.path().join("19").join("lib").join("windows");
        let rustflags = config.env.get("RUSTFLAGS").unwrap();
        assert!(rustflags.starts_with(" -Zsanitizer=address"), "{rustflags}");
        assert!(
            rustflags.contains("-l dylib=clang_rt.asan_dynamic-x86_64"),
            "{rustflags}"
        );
        assert!(
            rustflags.ends_with(&format!("-L{}", dir.display())),
            "{rustflags}"
        );
        assert_eq!(
            config.env.get("PATH"),
            Some(format!("C:/bin;{};", dir.display()).as_str())
        );
    }

    #[test]
    fn missing_sanitizer_runtime_fails_setup() {
        let root = tempfile::tempdir().unwrap();
        let root_str = root.path().to_str().unwrap().to_string();
        let err = DriverConfig::from_lookup(
            Path::new("/ws/sub"),
            PlatformInfo::status_code_based(),
            RunOptions { use_asan: true },
            &FixedTriple(None),
            lookup_from(&[(ENV_ASAN_ROOT, root_str.as_str())]),
        )
        .unwrap_err();
        assert!(matches!(err, TestFailure::SanitizerRuntimeNotFound { .. }));
    }

    #[test]
    fn resolver_failure_propagates() {
        struct Broken;
        impl ToolchainResolver for Broken {
            fn target_triple(&self) -> Result<Option<String>, TestFailure> {
                Err(TestFailure::Toolchain(String::from("rustup missing")))
            }
        }
        let err = DriverConfig::from_lookup(
            Path::new("/ws/sub"),
            PlatformInfo::signal_based(),
            RunOptions::default(),
            &Broken,
            lookup_from(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, TestFailure::Toolchain(_)));
    }
}
