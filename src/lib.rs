//! Iterable Segment Sync Library
//!
//! This library pulls a segment of customer records (recently engaged users on
//! a given plan) and pushes each one to Iterable through a `users/update` and
//! an `events/track` call, with retry, dual authentication and per-record
//! partial-failure accounting.
//!
//! # Modules
//!
//! - `auth`: API key and signed-token (JWT) header construction.
//! - `classify`: Maps raw Iterable responses to call outcomes.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `iterable_client`: Retrying Iterable API client and record processor.
//! - `models`: Records, call/record outcomes and the run report.
//! - `report`: Run summary logging and JSON report output.
//! - `retry`: Retry policy and backoff computation.
//! - `runner`: Sequential run over all records.
//! - `source`: Segment query and JSON record file loading.

pub mod auth;
pub mod classify;
pub mod config;
pub mod db;
pub mod errors;
pub mod iterable_client;
pub mod models;
pub mod report;
pub mod retry;
pub mod runner;
pub mod source;
