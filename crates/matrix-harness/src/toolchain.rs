//! Toolchain collaborators: target triple resolution and sanitizer runtime lookup.

use std::path::{Path, PathBuf};

use crate::error::TestFailure;
use crate::exec::{CommandSpec, Executor, OutputMode};

/// Candidate LLVM installs holding `clang_rt.asan_dynamic` on windows.
pub const DEFAULT_ASAN_ROOTS: [&str; 2] =
    ["C:/Program Files/LLVM/lib/clang/", "C:/LLVM/lib/clang/"];

/// Supplies the target triple passed as `--target=`.
///
/// `Ok(None)` means "build for the host without `--target`", which also drops the triple
/// component from the executable path.
pub trait ToolchainResolver {
    fn target_triple(&self) -> Result<Option<String>, TestFailure>;
}

/// A preconfigured triple (or none).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedTriple(pub Option<String>);

impl ToolchainResolver for FixedTriple {
    fn target_triple(&self) -> Result<Option<String>, TestFailure> {
        Ok(self.0.clone())
    }
}

/// Reads the triple of the active rustup toolchain.
pub struct RustupResolver<'a, E: Executor> {
    executor: &'a E,
}

impl<'a, E: Executor> RustupResolver<'a, E> {
    #[must_use]
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }
}

impl<E: Executor> ToolchainResolver for RustupResolver<'_, E> {
    fn target_triple(&self) -> Result<Option<String>, TestFailure> {
        let spec = CommandSpec::new("rustup").args(["toolchain", "list"]);
        let out = self.executor.execute(&spec, OutputMode::Capture)?;
        if !out.success() {
            return Err(TestFailure::Toolchain(format!(
                "`{}` exited with {}",
                spec.display(),
                out.raw
            )));
        }
        parse_active_triple(&String::from_utf8_lossy(&out.stdout)).map(Some)
    }
}

/// Extract the target triple from `rustup toolchain list` output.
pub fn parse_active_triple(listing: &str) -> Result<String, TestFailure> {
    let active = listing
        .lines()
        .find(|line| line.contains("active"))
        .and_then(|line| line.split_whitespace().next())
        .ok_or_else(|| TestFailure::Toolchain(String::from("no active toolchain listed")))?;

    if active.contains("aarch64-apple-darwin") {
        return Ok(String::from("aarch64-apple-darwin"));
    }
    trailing_triple(active).map(str::to_owned).ok_or_else(|| {
        TestFailure::Toolchain(format!("cannot find a target triple in `{active}`"))
    })
}

/// Last four `-`-separated word segments of a toolchain name.
///
/// The leftmost of the four may be the word-character tail of a longer segment.
fn trailing_triple(name: &str) -> Option<&str> {
    let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
    let segments: Vec<&str> = name.rsplitn(5, '-').collect();
    if segments.len() < 4 {
        return None;
    }
    let (full, first) = (&segments[..3], segments[3]);
    if full.iter().any(|s| s.is_empty() || !s.chars().all(is_word_char)) {
        return None;
    }
    let tail_start = first
        .char_indices()
        .rev()
        .take_while(|&(_, c)| is_word_char(c))
        .last()
        .map(|(i, _)| i)?;
    let len = (first.len() - tail_start) + full.iter().map(|s| s.len() + 1).sum::<usize>();
    Some(&name[name.len() - len..])
}

/// Locate the newest `lib/windows` sanitizer runtime under `roots`.
///
/// Each root is expected to contain one all-digit directory per clang major version.
pub fn find_asan_runtime(roots: &[PathBuf]) -> Result<PathBuf, TestFailure> {
    let mut best: Option<(u64, &Path)> = None;
    for root in roots {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        let newest = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().and_then(parse_version))
            .max();
        let Some(version) = newest else {
            continue;
        };
        if best.is_none_or(|(current, _)| version > current) {
            best = Some((version, root.as_path()));
        }
    }

    best.map(|(version, root)| root.join(version.to_string()).join("lib").join("windows"))
        .ok_or_else(|| TestFailure::SanitizerRuntimeNotFound {
            searched: roots.to_vec(),
        })
}

fn parse_version(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
