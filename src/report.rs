use crate::errors::{AppError, ResultExt};
use crate::models::RunReport;
use chrono::Local;
use std::path::{Path, PathBuf};

/// Logs the run summary block.
pub fn log_summary(report: &RunReport) {
    tracing::info!("{}", "=".repeat(70));
    tracing::info!("INTEGRATION SUMMARY");
    tracing::info!("{}", "=".repeat(70));
    tracing::info!("Total users: {}", report.total_users);
    if report.interrupted {
        tracing::warn!("Run interrupted after {} records", report.processed());
    }
    tracing::info!("✓ Successful (both API calls): {}", report.successful);
    tracing::info!("⚠ Partial failures (one call failed): {}", report.partial_failures);
    tracing::info!("✗ Total failures (both calls failed): {}", report.total_failures);
    tracing::info!("{}", "=".repeat(70));
}

/// File name for a report written now, e.g. `integration_results_20240501_120000.json`.
pub fn report_file_name() -> String {
    format!(
        "integration_results_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Writes the report as pretty JSON into `dir` and returns the file path.
pub async fn write_report(report: &RunReport, dir: &Path) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create results directory {}", dir.display()))?;

    let path = dir.join(report_file_name());
    let body = serde_json::to_vec_pretty(report).context("Failed to serialize run report")?;

    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to save results to {}", path.display()))?;

    tracing::info!("Detailed results saved to: {}", path.display());
    Ok(path)
}
