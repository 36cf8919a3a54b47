//! Record sources: the customer database segment query and JSON record files.

use crate::errors::{AppError, ResultExt};
use crate::models::EnrichmentRecord;
use sqlx::PgPool;
use std::path::Path;

/// Segment filter: users on `plan_type` who viewed one of `pages` within the
/// last `window_days` days.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentQuery {
    pub plan_type: String,
    pub pages: Vec<String>,
    pub window_days: i32,
}

impl Default for SegmentQuery {
    fn default() -> Self {
        Self {
            plan_type: "pro".to_string(),
            pages: vec!["pricing".to_string(), "settings".to_string()],
            window_days: 7,
        }
    }
}

/// Latest qualifying page view per customer, newest first.
const SEGMENT_SQL: &str = r#"
    WITH ranked_views AS (
        SELECT
            c.id,
            c.email,
            c.first_name,
            c.last_name,
            c.plan_type,
            c.candidate::text AS candidate,
            pv.page,
            pv.device,
            pv.browser,
            pv.location,
            pv.event_time::timestamptz AS event_time,
            ROW_NUMBER() OVER (PARTITION BY c.id ORDER BY pv.event_time DESC) AS view_rank
        FROM customers c
        INNER JOIN page_views pv ON c.id = pv.user_id
        WHERE c.plan_type = $1
            AND pv.page = ANY($2)
            AND pv.event_time >= CURRENT_DATE - $3::int
    )
    SELECT
        email,
        first_name,
        last_name,
        plan_type,
        candidate,
        page,
        device,
        browser,
        location,
        event_time
    FROM ranked_views
    WHERE view_rank = 1
    ORDER BY event_time DESC
"#;

/// Runs the segment query against the customer database.
pub async fn fetch_candidates(
    pool: &PgPool,
    query: &SegmentQuery,
) -> Result<Vec<EnrichmentRecord>, AppError> {
    tracing::info!(
        "Fetching {} users with {:?} page views in the last {} days",
        query.plan_type,
        query.pages,
        query.window_days
    );

    let records = sqlx::query_as::<_, EnrichmentRecord>(SEGMENT_SQL)
        .bind(&query.plan_type)
        .bind(&query.pages)
        .bind(query.window_days)
        .fetch_all(pool)
        .await
        .context("Error executing segment query")?;

    tracing::info!("Query executed successfully, returned {} rows", records.len());
    Ok(records)
}

/// Loads records from a JSON array file.
pub async fn load_records_file(path: &Path) -> Result<Vec<EnrichmentRecord>, AppError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read records file {}", path.display()))?;

    let records: Vec<EnrichmentRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records file {}", path.display()))?;

    tracing::info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}
