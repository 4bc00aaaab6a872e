//! Run report generation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::DriverConfig;
use crate::etalon::{self, EtalonArtifact};
use crate::exit_code::PlatformFamily;
use crate::matrix::TestCase;
use crate::verify::RunSummary;

/// Machine- and human-readable record of one matrix run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub title: String,
    /// Timestamp (UTC).
    pub timestamp: String,
    pub platform: PlatformFamily,
    pub target_triple: Option<String>,
    pub sanitizer: bool,
    pub summary: RunSummary,
    /// Etalons the run compared against.
    pub etalons: Vec<EtalonArtifact>,
    /// Why `etalons` is empty when fingerprinting failed.
    pub etalon_error: Option<String>,
    /// Message of the failure that stopped the run.
    pub failure: Option<String>,
}

impl RunReport {
    /// Report for a run of `config`, stamped now.
    #[must_use]
    pub fn new(config: &DriverConfig, summary: RunSummary, failure: Option<String>) -> Self {
        Self {
            title: format!("{} build matrix", config.bin_name),
            timestamp: crate::structured_log::now_utc(),
            platform: config.platform.family,
            target_triple: config.target_triple.clone(),
            sanitizer: config.sanitizer,
            summary,
            etalons: Vec::new(),
            etalon_error: None,
            failure,
        }
    }

    /// Fingerprint the etalons of `cases`. A failure is recorded instead of the table.
    #[must_use]
    pub fn with_etalons(mut self, root: &Path, cases: &[TestCase]) -> Self {
        match etalon::fingerprint_all(root, cases) {
            Ok(etalons) => self.etalons = etalons,
            Err(err) => self.etalon_error = Some(err.to_string()),
        }
        self
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Platform: {:?}\n", self.platform));
        out.push_str(&format!(
            "- Target: {}\n",
            self.target_triple.as_deref().unwrap_or("host")
        ));
        out.push_str(&format!("- Sanitizer: {}\n", self.sanitizer));
        out.push_str(&format!("- Total: {}\n", self.summary.total));
        out.push_str(&format!("- Passed: {}\n", self.summary.passed));
        out.push_str(&format!("- Failed: {}\n", self.summary.failed));
        out.push_str(&format!("- Elapsed: {} ms\n\n", self.summary.elapsed_ms));

        out.push_str("| Case | Variant | Exit | Status |\n");
        out.push_str("|------|---------|------|--------|\n");
        for cell in &self.summary.cells {
            let status = if cell.passed { "PASS" } else { "FAIL" };
            let exit = cell
                .exit_code
                .map_or_else(|| String::from("-"), |c| c.to_string());
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                cell.case, cell.variant, exit, status
            ));
        }

        if !self.etalons.is_empty() {
            out.push_str("\n| Etalon | Bytes | SHA-256 |\n");
            out.push_str("|--------|-------|---------|\n");
            for etalon in &self.etalons {
                out.push_str(&format!(
                    "| {} | {} | `{}` |\n",
                    etalon.path, etalon.size_bytes, etalon.sha256
                ));
            }
        }

        if let Some(err) = &self.etalon_error {
            out.push_str(&format!("\nEtalons unavailable: {err}\n"));
        }

        if let Some(failure) = &self.failure {
            out.push_str("\n## Failure\n\n```\n");
            out.push_str(failure);
            out.push_str("\n```\n");
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    /// Write JSON to `path` and markdown next to it (`.md`).
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json())?;
        std::fs::write(path.with_extension("md"), self.to_markdown())
    }
}
