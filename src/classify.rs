//! Maps a raw Iterable response to a [`CallOutcome`].
//!
//! Iterable reports application errors inside 2xx responses, so a transport
//! success is only a call success when the body's `code` is `"Success"`.

use crate::models::{CallOutcome, ResponseBody};
use serde_json::Value;

/// Application-level success marker in Iterable responses.
pub const SUCCESS_CODE: &str = "Success";

/// Decodes a response body, keeping the raw text when it is not JSON.
pub fn decode_body(text: &str) -> ResponseBody {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => ResponseBody::Json(value),
        Err(_) => ResponseBody::Text(text.to_string()),
    }
}

/// Classifies one HTTP response. The returned outcome has no attempt records;
/// the caller attaches them.
pub fn classify_response(endpoint: &str, status: u16, text: &str) -> CallOutcome {
    let response = decode_body(text);
    if let ResponseBody::Text(_) = response {
        tracing::debug!("{} returned a non-JSON body (status {})", endpoint, status);
    }

    let success = match status {
        500..=u16::MAX => {
            tracing::error!(
                "5xx Server Error from {}: Status {} Response: {:?}",
                endpoint,
                status,
                response
            );
            false
        }
        400..=499 => {
            tracing::error!(
                "4xx Client Error from {}: Status {} Response: {:?}",
                endpoint,
                status,
                response
            );
            false
        }
        200..=299 => {
            let code = response.field("code").unwrap_or("Unknown");
            if code == SUCCESS_CODE {
                tracing::info!(
                    "{} call successful: {}",
                    endpoint,
                    response.field("msg").unwrap_or(SUCCESS_CODE)
                );
                true
            } else {
                tracing::warn!(
                    "{} returned HTTP {} but error code: {} Message: {}",
                    endpoint,
                    status,
                    code,
                    response.field("msg").unwrap_or("No message")
                );
                false
            }
        }
        _ => {
            tracing::warn!("Unexpected status code from {}: {}", endpoint, status);
            false
        }
    };

    CallOutcome {
        endpoint: endpoint.to_string(),
        success,
        status: Some(status),
        response,
        error: None,
        attempts: Vec::new(),
    }
}
