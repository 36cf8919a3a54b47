/// Property-based tests using proptest
/// Tests invariants of response classification and backoff computation
use iterable_sync::classify::classify_response;
use iterable_sync::models::{AttemptRecord, CallOutcome, RecordOutcome, RecordStatus, ResponseBody};
use iterable_sync::retry::{is_retryable_status, RetryPolicy};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

// Property: classification never panics and is a pure function
proptest! {
    #[test]
    fn classification_never_panics(status in 0u16..1000, body in "\\PC*") {
        let _ = classify_response("users/update", status, &body);
    }

    #[test]
    fn classification_is_idempotent(status in 100u16..600, body in "\\PC*") {
        let first = classify_response("events/track", status, &body);
        let second = classify_response("events/track", status, &body);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn only_2xx_with_success_code_succeeds(status in 100u16..600, code in "[A-Za-z]{1,12}") {
        let body = format!(r#"{{"code":"{}"}}"#, code);
        let outcome = classify_response("users/update", status, &body);
        prop_assert_eq!(
            outcome.success,
            (200..300).contains(&status) && code == "Success"
        );
    }

    #[test]
    fn retryable_statuses_never_succeed(
        status in prop::sample::select(vec![408u16, 429, 500, 502, 503, 504])
    ) {
        prop_assert!(is_retryable_status(status));
        let outcome = classify_response("users/update", status, r#"{"code":"Success"}"#);
        prop_assert!(!outcome.success);
    }
}

// Property: backoff follows initial * factor^i and jitter stays within ±10%
proptest! {
    #[test]
    fn backoff_matches_formula(
        initial_ms in 1u64..5_000,
        factor in 1.0f64..4.0,
        attempt in 0u32..8,
        seed in any::<u64>()
    ) {
        let policy = RetryPolicy::new(3, Duration::from_millis(initial_ms), factor);
        let expected = (initial_ms as f64 / 1000.0) * factor.powi(attempt as i32);

        let base = policy.backoff_for(attempt).as_secs_f64();
        prop_assert!((base - expected).abs() <= expected * 1e-9 + 1e-9);

        let mut rng = StdRng::seed_from_u64(seed);
        let jittered = policy.jittered_backoff_with(attempt, &mut rng).as_secs_f64();
        prop_assert!(jittered >= expected * 0.9 - 1e-6);
        prop_assert!(jittered <= expected * 1.1 + 1e-6);
    }

    #[test]
    fn backoff_is_monotonic_without_jitter(initial_ms in 1u64..5_000, factor in 1.0f64..4.0) {
        let policy = RetryPolicy::new(5, Duration::from_millis(initial_ms), factor);
        for attempt in 0..6 {
            prop_assert!(policy.backoff_for(attempt) <= policy.backoff_for(attempt + 1));
        }
    }
}

fn call(success: bool) -> CallOutcome {
    CallOutcome {
        endpoint: "users/update".to_string(),
        success,
        status: Some(200),
        response: ResponseBody::Text(String::new()),
        error: None,
        attempts: vec![AttemptRecord {
            attempt: 1,
            status: Some(200),
            error: None,
            backoff_ms: None,
        }],
    }
}

// Property: overall success is the logical AND of both calls
proptest! {
    #[test]
    fn overall_success_is_and(update in any::<bool>(), track in any::<bool>()) {
        let outcome = RecordOutcome::completed("a@example.com", call(update), call(track));
        prop_assert_eq!(outcome.overall_success, update && track);

        let expected = match (update, track) {
            (true, true) => RecordStatus::Success,
            (false, false) => RecordStatus::TotalFailure,
            _ => RecordStatus::PartialFailure,
        };
        prop_assert_eq!(outcome.status(), expected);
    }
}
