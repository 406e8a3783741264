//! Report persistence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deepstack_signals::{extract_domain, CollectionReport};

use crate::config::TOOL_NAME;

/// Where a run's report goes: `<tool>_output-<domain>.json` for a single
/// target, `<tool>_output.json` for a batch.
pub fn report_path(output_dir: &Path, single_target: Option<&str>) -> PathBuf {
    let file_name = match single_target {
        Some(url) => format!("{TOOL_NAME}_output-{}.json", extract_domain(url)),
        None => format!("{TOOL_NAME}_output.json"),
    };
    output_dir.join(file_name)
}

/// Write the report pretty-printed. The file is written next to its final
/// location and renamed into place, so readers never see a partial report.
pub fn write_report(report: &CollectionReport, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let json = serde_json::to_vec_pretty(report).context("failed to serialize report")?;
    std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move report into place at {}", path.display()))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}
