use crate::iterable_client::IterableClient;
use crate::models::{EnrichmentRecord, RunReport};
use std::sync::atomic::{AtomicBool, Ordering};

/// Processes every record in order and accumulates a [`RunReport`].
///
/// A failing record never aborts the run. `stop` is checked between records
/// only, so an in-flight record always completes both calls.
pub async fn run_records(
    client: &IterableClient,
    records: &[EnrichmentRecord],
    stop: &AtomicBool,
) -> RunReport {
    let total = records.len();
    let mut report = RunReport::new(total);
    tracing::info!(run_id = %report.run_id, "Processing {} user records", total);

    for (index, record) in records.iter().enumerate() {
        if stop.load(Ordering::SeqCst) {
            tracing::warn!(
                "Stop requested; ending run after {}/{} records",
                index,
                total
            );
            report.interrupted = true;
            break;
        }

        tracing::info!("Processing record {}/{}", index + 1, total);
        let outcome = client.process_record(record).await;
        report.push(outcome);
    }

    report.finish();
    report
}
