use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use iterable_sync::config::{Config, RecordSource};
use iterable_sync::db::Database;
use iterable_sync::iterable_client::IterableClient;
use iterable_sync::{report, runner, source};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes tracing: console output plus an optional plain-text log file.
///
/// `RUST_LOG` wins over `LOG_LEVEL`; `LOG_FILE` adds a non-ANSI file layer.
fn init_tracing() {
    let level = std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();

    let mut file_error = None;
    let file_layer = match std::env::var("LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                ),
                Err(e) => {
                    file_error = Some(format!("Could not create log file {}: {}", path, e));
                    None
                }
            }
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("iterable_sync={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("{}", e);
    }
}

/// Main integration workflow:
/// 1. Load configuration
/// 2. Fetch the user segment (database or records file)
/// 3. Initialize the Iterable client
/// 4. Run users/update + events/track for each record
/// 5. Log the summary and save the detailed report
async fn run_integration() -> anyhow::Result<()> {
    tracing::info!("{}", "=".repeat(70));
    tracing::info!("Starting Iterable Integration");
    tracing::info!("{}", "=".repeat(70));

    tracing::info!("[STEP 1] Loading configuration...");
    let config = Config::from_env()?;

    tracing::info!("[STEP 2] Fetching users with recent engagement...");
    let records = match &config.source {
        RecordSource::Database {
            database_url,
            query,
        } => {
            let db = Database::new(database_url).await?;
            let records = source::fetch_candidates(&db.pool, query).await;
            db.close().await;
            records?
        }
        RecordSource::File(path) => source::load_records_file(path).await?,
    };

    if records.is_empty() {
        tracing::warn!("No users with recent engagement found; nothing to do");
        return Ok(());
    }
    tracing::info!("Found {} user(s) with recent engagement", records.len());

    tracing::info!("[STEP 3] Initializing Iterable API client...");
    let client = IterableClient::new(&config.client)?;
    tracing::info!("✓ Iterable API client initialized: {}", client.base_url());

    // Stop between records on Ctrl-C; the partial report is still saved.
    let stop = Arc::new(AtomicBool::new(false));
    let signal_flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Integration interrupted by user");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    tracing::info!("[STEP 4] Processing user records...");
    let run_report = runner::run_records(&client, &records, &stop).await;

    tracing::info!("[STEP 5] Generating summary report...");
    report::log_summary(&run_report);
    if let Err(e) = report::write_report(&run_report, &config.results_dir).await {
        tracing::error!("{}", e);
    }

    tracing::info!("Integration complete!");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run_integration().await {
        tracing::error!("Integration failed: {:#}", e);
        return Err(e);
    }

    Ok(())
}
