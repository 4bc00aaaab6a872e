//! Temporary LTO directive in the workspace manifest.
//!
//! [`ManifestGuard::apply_lto`] copies the manifest to `<manifest>.orig`, appends a
//! `[profile.release]` section, and hands back a guard. The backup is moved over the
//! manifest when the guard is restored or dropped, so the original bytes come back on
//! normal returns, errors and panics. Termination by a signal (Ctrl-C) skips `Drop` and
//! leaves `<manifest>.orig` behind; the next run refuses to start until it is moved back.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::TestFailure;
use crate::matrix::LtoMode;

/// Text appended to the manifest for `mode`.
#[must_use]
pub fn lto_directive(mode: &str) -> String {
    format!("\n[profile.release]\nlto = \"{mode}\"\n")
}

/// Where the pristine manifest is kept while mutated.
#[must_use]
pub fn backup_path(manifest: &Path) -> PathBuf {
    let mut name = OsString::from(manifest.as_os_str());
    name.push(".orig");
    PathBuf::from(name)
}

/// Restores the manifest from its backup when restored or dropped.
#[derive(Debug)]
pub struct ManifestGuard {
    manifest: PathBuf,
    backup: PathBuf,
    restored: bool,
}

impl ManifestGuard {
    /// Append the directive for `mode`. Returns `Ok(None)` when `mode` adds nothing.
    pub fn apply_lto(manifest: &Path, mode: LtoMode) -> Result<Option<Self>, TestFailure> {
        let Some(directive) = mode.directive() else {
            return Ok(None);
        };

        let backup = backup_path(manifest);
        if backup.exists() {
            return Err(TestFailure::StaleBackup {
                manifest: manifest.to_path_buf(),
                backup,
            });
        }
        std::fs::copy(manifest, &backup).map_err(|e| TestFailure::io(manifest, e))?;

        // Armed before the append: a failed write still puts the original back.
        let guard = Self {
            manifest: manifest.to_path_buf(),
            backup,
            restored: false,
        };
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(manifest)
            .map_err(|e| TestFailure::io(manifest, e))?;
        file.write_all(lto_directive(directive).as_bytes())
            .map_err(|e| TestFailure::io(manifest, e))?;
        Ok(Some(guard))
    }

    #[must_use]
    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    /// Put the original manifest back, reporting failures.
    pub fn restore(mut self) -> Result<(), TestFailure> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> Result<(), TestFailure> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        std::fs::rename(&self.backup, &self.manifest).map_err(|e| TestFailure::io(&self.backup, e))
    }
}

impl Drop for ManifestGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore_inner() {
            eprintln!("matrix-harness: failed to restore manifest: {err}");
        }
    }
}
