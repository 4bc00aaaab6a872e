//! Etalon loading and fingerprinting.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::error::TestFailure;
use crate::matrix::TestCase;

/// Expected bytes of a stream. `None` means the stream must stay empty.
pub fn load_expected(root: &Path, etalon: Option<&Path>) -> Result<Vec<u8>, TestFailure> {
    match etalon {
        Some(rel) => {
            let path = root.join(rel);
            std::fs::read(&path).map_err(|e| TestFailure::io(&path, e))
        }
        None => Ok(Vec::new()),
    }
}

/// Content fingerprint of one etalon file, recorded in run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtalonArtifact {
    /// Path relative to the subject directory.
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
}

impl EtalonArtifact {
    #[must_use]
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            sha256: hex_lower(&sha2::Sha256::digest(bytes)),
            size_bytes: bytes.len() as u64,
        }
    }
}

/// Fingerprint every distinct etalon referenced by `cases`, sorted by path.
pub fn fingerprint_all(
    root: &Path,
    cases: &[TestCase],
) -> Result<Vec<EtalonArtifact>, TestFailure> {
    let paths: BTreeSet<&Path> = cases
        .iter()
        .flat_map(|c| [c.expected_stdout.as_deref(), c.expected_stderr.as_deref()])
        .flatten()
        .collect();
    paths
        .into_iter()
        .map(|rel| {
            let bytes = load_expected(root, Some(rel))?;
            Ok(EtalonArtifact::from_bytes(
                rel.to_string_lossy().replace('\\', "/"),
                &bytes,
            ))
        })
        .collect()
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}
