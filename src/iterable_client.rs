use crate::auth::AuthManager;
use crate::classify::classify_response;
use crate::config::ClientConfig;
use crate::errors::{AppError, ResultExt};
use crate::models::{AttemptRecord, CallOutcome, EnrichmentRecord, RecordOutcome, RecordRejection};
use crate::retry::{is_retryable_status, RetryPolicy};
use reqwest::Method;
use serde::Serialize;
use std::time::Duration;

/// Documented Iterable rate ceiling for `users/update`, in requests per second.
pub const USERS_UPDATE_RATE_LIMIT: u32 = 500;
/// Documented Iterable rate ceiling for `events/track`, in requests per second.
pub const EVENTS_TRACK_RATE_LIMIT: u32 = 2000;

pub const USERS_UPDATE_ENDPOINT: &str = "users/update";
pub const EVENTS_TRACK_ENDPOINT: &str = "events/track";

/// Event name sent for every tracked record.
pub const PAGE_VIEW_EVENT: &str = "page_view";

// ============ Payloads ============

/// Profile fields for `users/update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDataFields<'a> {
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub plan_type: Option<&'a str>,
    pub recent_page_view: bool,
    pub candidate: Option<&'a str>,
}

/// Event fields for `events/track`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDataFields<'a> {
    pub page: Option<&'a str>,
    /// Sourced from the record's `device` column.
    pub browser: Option<&'a str>,
    pub location: Option<&'a str>,
    pub timestamp: Option<String>,
    pub candidate: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UserUpdateRequest<'a> {
    email: &'a str,
    #[serde(rename = "dataFields")]
    data_fields: &'a UserDataFields<'a>,
}

#[derive(Debug, Serialize)]
struct TrackEventRequest<'a> {
    email: &'a str,
    #[serde(rename = "eventName")]
    event_name: &'a str,
    #[serde(rename = "dataFields")]
    data_fields: &'a EventDataFields<'a>,
}

/// Builds the `users/update` data fields from a record.
pub fn user_data_fields(record: &EnrichmentRecord) -> UserDataFields<'_> {
    UserDataFields {
        first_name: record.first_name.as_deref(),
        last_name: record.last_name.as_deref(),
        plan_type: record.plan_type.as_deref(),
        recent_page_view: true,
        candidate: record.candidate.as_deref(),
    }
}

/// Builds the `events/track` data fields from a record.
///
/// Note: the destination `browser` field is fed from the source `device` column.
pub fn event_data_fields(record: &EnrichmentRecord) -> EventDataFields<'_> {
    EventDataFields {
        page: record.page.as_deref(),
        browser: record.device.as_deref(),
        location: record.location.as_deref(),
        timestamp: record.event_time.map(|t| t.to_rfc3339()),
        candidate: record.candidate.as_deref(),
    }
}

// ============ Client ============

/// Client for the Iterable `users/update` and `events/track` endpoints.
///
/// Every call goes through a bounded retry loop; failures are returned as
/// [`CallOutcome`] values rather than errors.
#[derive(Clone)]
pub struct IterableClient {
    client: reqwest::Client,
    base_url: String,
    auth: AuthManager,
    policy: RetryPolicy,
    timeout: Duration,
}

impl IterableClient {
    /// Creates a new `IterableClient`.
    ///
    /// Only fails if the underlying HTTP client cannot be built; missing or
    /// broken credentials are not a construction error.
    pub fn new(config: &ClientConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create Iterable client")?;

        tracing::debug!(
            "Iterable rate ceilings: users/update {} req/s, events/track {} req/s",
            USERS_UPDATE_RATE_LIMIT,
            EVENTS_TRACK_RATE_LIMIT
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: AuthManager::new(config.auth.as_ref()),
            policy: config.retry_policy(),
            timeout: config.timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Executes one request with retry and returns the classified outcome.
    ///
    /// Retryable statuses and transport errors are retried up to
    /// `max_retries` attempts in total, sleeping a jittered exponential
    /// backoff between attempts (never after the last one). Any other status
    /// is classified and returned immediately.
    pub async fn execute<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        payload: &T,
        endpoint: &str,
    ) -> CallOutcome {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_response: Option<CallOutcome> = None;
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            let sent = self
                .client
                .request(method.clone(), url)
                .headers(self.auth.headers())
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            // A body that cannot be read in full is a transport failure, not a response.
            let result = match sent {
                Ok(response) => {
                    let status = response.status().as_u16();
                    response.text().await.map(|text| (status, text))
                }
                Err(e) => Err(e),
            };

            match result {
                Ok((status, text)) => {
                    tracing::info!(
                        "{} attempt {}/{} -> HTTP {}",
                        endpoint,
                        attempt,
                        max_attempts,
                        status
                    );
                    attempts.push(AttemptRecord {
                        attempt,
                        status: Some(status),
                        error: None,
                        backoff_ms: None,
                    });

                    let outcome = classify_response(endpoint, status, &text);
                    if !is_retryable_status(status) {
                        return CallOutcome { attempts, ..outcome };
                    }
                    last_response = Some(outcome);
                }
                Err(e) => {
                    let error = if e.is_timeout() {
                        "Request timeout".to_string()
                    } else {
                        format!("Request failed: {}", e)
                    };
                    tracing::warn!(
                        "{} attempt {}/{} -> {}",
                        endpoint,
                        attempt,
                        max_attempts,
                        error
                    );
                    attempts.push(AttemptRecord {
                        attempt,
                        status: None,
                        error: Some(error.clone()),
                        backoff_ms: None,
                    });
                    last_error = Some(error);
                }
            }

            if self.policy.has_attempts_left(attempt) {
                // Sleep after 1-based attempt n is initial * factor^(n-1): 1s, 2s, 4s...
                let delay = self.policy.jittered_backoff(attempt - 1);
                if let Some(record) = attempts.last_mut() {
                    record.backoff_ms = Some(delay.as_millis() as u64);
                }
                tracing::warn!(
                    "Retrying {} in {:.2}s (attempt {}/{})",
                    endpoint,
                    delay.as_secs_f64(),
                    attempt + 1,
                    max_attempts
                );
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!("{} exhausted {} attempts", endpoint, max_attempts);
        let outcome = match last_response {
            Some(outcome) => outcome,
            None => CallOutcome::transport_failure(
                endpoint,
                last_error.unwrap_or_else(|| "No response received".to_string()),
            ),
        };
        CallOutcome { attempts, ..outcome }
    }

    /// Updates a user profile via `users/update`.
    pub async fn update_user(&self, email: &str, data_fields: &UserDataFields<'_>) -> CallOutcome {
        let url = format!("{}/api/users/update", self.base_url);
        tracing::debug!("Calling users/update for email: {}", email);

        let payload = UserUpdateRequest { email, data_fields };
        let outcome = self
            .execute(Method::POST, &url, &payload, USERS_UPDATE_ENDPOINT)
            .await;

        if !outcome.success {
            tracing::error!("Failed to update user {}. Response: {:?}", email, outcome.response);
        }
        outcome
    }

    /// Tracks an event via `events/track`.
    pub async fn track_event(
        &self,
        email: &str,
        event_name: &str,
        data_fields: &EventDataFields<'_>,
    ) -> CallOutcome {
        let url = format!("{}/api/events/track", self.base_url);
        tracing::debug!("Calling events/track for email: {}, event: {}", email, event_name);

        let payload = TrackEventRequest {
            email,
            event_name,
            data_fields,
        };
        let outcome = self
            .execute(Method::POST, &url, &payload, EVENTS_TRACK_ENDPOINT)
            .await;

        if !outcome.success {
            tracing::error!(
                "Failed to track event for {}. Response: {:?}",
                email,
                outcome.response
            );
        }
        outcome
    }

    /// Processes one record: `users/update` then `events/track`.
    ///
    /// Both calls are always attempted for a record with an identity key; a
    /// record without one makes no calls at all.
    pub async fn process_record(&self, record: &EnrichmentRecord) -> RecordOutcome {
        let Some(email) = record.identity() else {
            tracing::error!("User record missing email address");
            return RecordOutcome::rejected(
                record.email.as_deref(),
                RecordRejection::MissingIdentity,
            );
        };

        tracing::info!("Processing user: {}", email);

        let update = self.update_user(email, &user_data_fields(record)).await;
        let track = self
            .track_event(email, PAGE_VIEW_EVENT, &event_data_fields(record))
            .await;

        let outcome = RecordOutcome::completed(email, update, track);
        if outcome.overall_success {
            tracing::info!("✓ Successfully processed user: {}", email);
        } else {
            tracing::warn!("✗ Failure processing user: {} ({:?})", email, outcome.status());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn sample_record() -> EnrichmentRecord {
        EnrichmentRecord {
            email: Some("ada@example.com".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            plan_type: Some("pro".to_string()),
            candidate: Some("A".to_string()),
            page: Some("pricing".to_string()),
            device: Some("mobile".to_string()),
            browser: Some("firefox".to_string()),
            location: Some("London".to_string()),
            event_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_client_creation_without_auth() {
        let config = ClientConfig {
            auth: None,
            ..ClientConfig::default()
        };
        let client = IterableClient::new(&config);
        assert!(client.is_ok());
        assert!(!client.unwrap().auth().has_credential());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ClientConfig {
            base_url: "https://api.iterable.com/".to_string(),
            ..ClientConfig::default()
        };
        let client = IterableClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://api.iterable.com");
    }

    #[test]
    fn test_user_update_payload_shape() {
        let record = sample_record();
        let fields = user_data_fields(&record);
        let payload = UserUpdateRequest {
            email: "ada@example.com",
            data_fields: &fields,
        };

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "email": "ada@example.com",
                "dataFields": {
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "plan_type": "pro",
                    "recent_page_view": true,
                    "candidate": "A"
                }
            })
        );
    }

    #[test]
    fn test_track_payload_maps_device_to_browser() {
        let record = sample_record();
        let fields = event_data_fields(&record);
        let payload = TrackEventRequest {
            email: "ada@example.com",
            event_name: PAGE_VIEW_EVENT,
            data_fields: &fields,
        };

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "email": "ada@example.com",
                "eventName": "page_view",
                "dataFields": {
                    "page": "pricing",
                    "browser": "mobile",
                    "location": "London",
                    "timestamp": "2024-05-01T12:00:00+00:00",
                    "candidate": "A"
                }
            })
        );
    }

    #[test]
    fn test_missing_fields_serialize_as_null() {
        let record = EnrichmentRecord {
            email: Some("x@example.com".to_string()),
            ..EnrichmentRecord::default()
        };
        let value = serde_json::to_value(event_data_fields(&record)).unwrap();
        assert_eq!(value["browser"], serde_json::Value::Null);
        assert_eq!(value["timestamp"], serde_json::Value::Null);
    }
}
