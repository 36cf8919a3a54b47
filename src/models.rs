use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// ============ Input Models ============

/// One enrichment candidate: a user and their most recent qualifying page view.
///
/// Produced by a record source (database segment query or JSON file) and
/// consumed exactly once by the Iterable client.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    /// Identity key in Iterable. Records without one are never sent.
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Plan tier (e.g. "pro").
    pub plan_type: Option<String>,
    /// Opaque passthrough tag forwarded to both calls.
    pub candidate: Option<String>,
    pub page: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub location: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
}

impl EnrichmentRecord {
    /// Returns the identity key if present and non-blank.
    pub fn identity(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

// ============ Call Outcomes ============

/// Decoded response body: JSON when parseable, raw text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    /// Looks up a top-level string field of a JSON object body.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            ResponseBody::Json(value) => value.get(name).and_then(Value::as_str),
            ResponseBody::Text(_) => None,
        }
    }
}

/// Diagnostic record for a single HTTP attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Transport error description (timeout, connection refused...).
    pub error: Option<String>,
    /// Backoff slept after this attempt before the next one, in milliseconds.
    pub backoff_ms: Option<u64>,
}

/// Result of one logical API call (possibly spanning several attempts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Endpoint label, e.g. "users/update".
    pub endpoint: String,
    pub success: bool,
    /// Last observed HTTP status. `None` when no response was ever received.
    pub status: Option<u16>,
    pub response: ResponseBody,
    /// Transport error marker when no response was ever received.
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

impl CallOutcome {
    /// Builds the outcome for a call that never received a response.
    pub fn transport_failure(endpoint: &str, error: String) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            success: false,
            status: None,
            response: ResponseBody::Json(serde_json::json!({ "error": error })),
            error: Some(error),
            attempts: Vec::new(),
        }
    }

    /// Optional `msg` field of the Iterable response.
    pub fn message(&self) -> Option<&str> {
        self.response.field("msg")
    }

    /// Number of HTTP attempts made for this call.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

// ============ Record Outcomes ============

/// Why a record was rejected before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordRejection {
    MissingIdentity,
}

/// Aggregate status of a processed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    /// Exactly one of the two calls succeeded.
    PartialFailure,
    /// Neither call succeeded (including rejected records).
    TotalFailure,
}

/// Outcome of both Iterable calls for one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// Identity key as received (empty when missing).
    pub email: String,
    pub timestamp: DateTime<Utc>,
    /// `None` when the call was never attempted.
    pub users_update: Option<CallOutcome>,
    pub events_track: Option<CallOutcome>,
    /// True only when both calls succeeded.
    pub overall_success: bool,
    pub rejection: Option<RecordRejection>,
}

impl RecordOutcome {
    pub fn rejected(email: Option<&str>, rejection: RecordRejection) -> Self {
        Self {
            email: email.unwrap_or_default().to_string(),
            timestamp: Utc::now(),
            users_update: None,
            events_track: None,
            overall_success: false,
            rejection: Some(rejection),
        }
    }

    pub fn completed(email: &str, users_update: CallOutcome, events_track: CallOutcome) -> Self {
        let overall_success = users_update.success && events_track.success;
        Self {
            email: email.to_string(),
            timestamp: Utc::now(),
            users_update: Some(users_update),
            events_track: Some(events_track),
            overall_success,
            rejection: None,
        }
    }

    pub fn status(&self) -> RecordStatus {
        let succeeded = [&self.users_update, &self.events_track]
            .into_iter()
            .filter(|call| matches!(call, Some(c) if c.success))
            .count();

        match succeeded {
            2 => RecordStatus::Success,
            1 => RecordStatus::PartialFailure,
            _ => RecordStatus::TotalFailure,
        }
    }

    /// Total HTTP attempts made for this record across both calls.
    pub fn network_attempts(&self) -> u32 {
        [&self.users_update, &self.events_track]
            .into_iter()
            .flatten()
            .map(CallOutcome::attempt_count)
            .sum()
    }
}

// ============ Run Report ============

/// Run-level aggregates plus every record outcome in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of records handed to the run.
    pub total_users: usize,
    pub successful: usize,
    pub partial_failures: usize,
    pub total_failures: usize,
    /// Set when a stop signal ended the run before every record was processed.
    pub interrupted: bool,
    pub records: Vec<RecordOutcome>,
}

impl RunReport {
    pub fn new(total_users: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            total_users,
            successful: 0,
            partial_failures: 0,
            total_failures: 0,
            interrupted: false,
            records: Vec::with_capacity(total_users),
        }
    }

    /// Appends an outcome and updates the counters.
    pub fn push(&mut self, outcome: RecordOutcome) {
        match outcome.status() {
            RecordStatus::Success => self.successful += 1,
            RecordStatus::PartialFailure => self.partial_failures += 1,
            RecordStatus::TotalFailure => self.total_failures += 1,
        }
        self.records.push(outcome);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn processed(&self) -> usize {
        self.records.len()
    }
}
