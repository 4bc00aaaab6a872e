//! Build command construction and artifact location.

use std::path::PathBuf;

use crate::config::DriverConfig;
use crate::exec::CommandSpec;
use crate::matrix::{BuildVariant, TestCase};

/// `cargo build` for one cell.
#[must_use]
pub fn build_command(
    config: &DriverConfig,
    case: &TestCase,
    variant: BuildVariant,
) -> CommandSpec {
    let mut spec =
        CommandSpec::new(config.cargo.as_str()).args(["build", "--verbose", "--workspace"]);
    for package in &config.excluded_packages {
        spec = spec.args(["--exclude", package.as_str()]);
    }
    spec = spec.args(["--bin", config.bin_name.as_str()]);
    if let Some(triple) = &config.target_triple {
        spec = spec.arg(format!("--target={triple}"));
    }
    if let Some(features) = case.feature_list() {
        spec = spec.arg(format!("--features={features}"));
    }
    if variant.is_release() {
        spec = spec.arg("--release");
    }
    if config.sanitizer {
        spec = spec.arg("-Zbuild-std");
    }
    spec.current_dir(&config.subject_dir).envs(&config.env)
}

/// `{target-dir}/{triple?}/{debug|release}/{bin}{exe-suffix}`.
#[must_use]
pub fn executable_path(config: &DriverConfig, variant: BuildVariant) -> PathBuf {
    let mut path = config.target_dir.clone();
    if let Some(triple) = &config.target_triple {
        path.push(triple);
    }
    path.push(variant.profile_dir());
    path.push(format!("{}{}", config.bin_name, config.platform.exe_suffix));
    path
}

/// Invocation of the built subject: no arguments, same environment as the build.
#[must_use]
pub fn subject_command(config: &DriverConfig, variant: BuildVariant) -> CommandSpec {
    CommandSpec::new(executable_path(config, variant))
        .current_dir(&config.subject_dir)
        .envs(&config.env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_code::PlatformInfo;
    use crate::matrix::{
        FEATURE_DEBUG_TYPE_NAME, FEATURE_UNSAFE_REMOVE_DUPLICATE_CHECKS, LtoMode,
    };

    fn config() -> DriverConfig {
        DriverConfig::new("/ws/extra_tests", PlatformInfo::signal_based())
    }

    #[test]
    fn debug_build_without_features() {
        let spec = build_command(&config(), &TestCase::new("c", 0), BuildVariant::Debug);
        assert_eq!(
            spec.display(),
            "cargo build --verbose --workspace --exclude benches --bin duplicate_type_ids_handling"
        );
        assert_eq!(spec.cwd, Some(PathBuf::from("/ws/extra_tests")));
    }

    #[test]
    fn release_build_with_target_features_and_sanitizer() {
        let mut cfg =
            config().with_target_triple(Some(String::from("x86_64-unknown-linux-gnu")));
        cfg.sanitizer = true;
        cfg.env.set("RUSTFLAGS", " -Zsanitizer=address");
        let case = TestCase::new("c", 0).with_features([
            FEATURE_UNSAFE_REMOVE_DUPLICATE_CHECKS,
            FEATURE_DEBUG_TYPE_NAME,
        ]);
        let spec = build_command(&cfg, &case, BuildVariant::Release(LtoMode::Thin));
        assert_eq!(
            &spec.args[7..],
            [
                "--target=x86_64-unknown-linux-gnu",
                "--features=debug_type_name,unsafe_remove_duplicate_checks",
                "--release",
                "-Zbuild-std",
            ]
        );
        assert_eq!(spec.env.get("RUSTFLAGS"), Some(" -Zsanitizer=address"));
    }

    #[test]
    fn executable_path_follows_triple_and_profile() {
        let cfg = config();
        assert_eq!(
            executable_path(&cfg, BuildVariant::Debug),
            PathBuf::from("/ws/target/debug/duplicate_type_ids_handling")
        );
        let cfg = cfg.with_target_triple(Some(String::from("aarch64-apple-darwin")));
        assert_eq!(
            executable_path(&cfg, BuildVariant::Release(LtoMode::Fat)),
            PathBuf::from("/ws/target/aarch64-apple-darwin/release/duplicate_type_ids_handling")
        );
    }

    #[test]
    fn windows_executables_get_suffix() {
        let cfg = DriverConfig::new("/ws/extra_tests", PlatformInfo::status_code_based());
        let path = executable_path(&cfg, BuildVariant::Debug);
        assert!(path.to_string_lossy().ends_with("duplicate_type_ids_handling.exe"));
    }

    #[test]
    fn subject_runs_without_arguments() {
        let spec = subject_command(&config(), BuildVariant::Release(LtoMode::None));
        assert!(spec.args.is_empty());
        assert_eq!(
            PathBuf::from(&spec.program),
            PathBuf::from("/ws/target/release/duplicate_type_ids_handling")
        );
    }
}
