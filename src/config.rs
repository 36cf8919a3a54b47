use crate::auth::AuthConfig;
use crate::retry::RetryPolicy;
use crate::source::SegmentQuery;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.iterable.com";
pub const DEFAULT_JWT_ISSUER: &str = "iterable-sync";

/// Settings consumed by [`crate::iterable_client::IterableClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    /// `None` is allowed: the client still builds and calls get rejected remotely.
    pub auth: Option<AuthConfig>,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_factor: f64,
    /// Per-attempt ceiling.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_backoff, self.backoff_factor)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth: None,
            max_retries: policy.max_retries,
            initial_backoff: policy.initial_backoff,
            backoff_factor: policy.backoff_factor,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Where enrichment candidates come from.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSource {
    Database {
        database_url: String,
        query: SegmentQuery,
    },
    /// JSON array of records, for dry runs and replays.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: RecordSource,
    pub client: ClientConfig,
    pub results_dir: PathBuf,
}

impl Config {
    /// Reads the process environment. `.env` files are loaded by the binary before this runs.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let source = match var("RECORDS_FILE") {
            Some(path) => RecordSource::File(PathBuf::from(path)),
            None => {
                let database_url = var("DATABASE_URL")
                    .or_else(|| var("DB_URL"))
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "DATABASE_URL or DB_URL environment variable required (or set RECORDS_FILE)"
                        )
                    })
                    .and_then(|url| {
                        if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                            anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                        }
                        Ok(url)
                    })?;

                let defaults = SegmentQuery::default();
                let query = SegmentQuery {
                    plan_type: var("SEGMENT_PLAN_TYPE").unwrap_or(defaults.plan_type),
                    pages: match var("SEGMENT_PAGES") {
                        Some(pages) => {
                            let pages: Vec<String> = pages
                                .split(',')
                                .map(|p| p.trim().to_string())
                                .filter(|p| !p.is_empty())
                                .collect();
                            if pages.is_empty() {
                                anyhow::bail!("SEGMENT_PAGES must list at least one page");
                            }
                            pages
                        }
                        None => defaults.pages,
                    },
                    window_days: parse_or(
                        "SEGMENT_WINDOW_DAYS",
                        var("SEGMENT_WINDOW_DAYS"),
                        defaults.window_days,
                        |d| {
                            if d < 1 {
                                anyhow::bail!("SEGMENT_WINDOW_DAYS must be at least 1");
                            }
                            Ok(d)
                        },
                    )?,
                };

                RecordSource::Database {
                    database_url,
                    query,
                }
            }
        };

        let defaults = ClientConfig::default();

        let base_url = var("ITERABLE_API_BASE_URL")
            .unwrap_or(defaults.base_url)
            .trim()
            .to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            anyhow::bail!("ITERABLE_API_BASE_URL must start with http:// or https://");
        }

        // The signed-token scheme wins when both credentials are present.
        let auth = match (var("ITERABLE_JWT_SECRET"), var("ITERABLE_API_KEY")) {
            (Some(secret), _) => Some(AuthConfig::SignedToken {
                secret,
                issuer: var("ITERABLE_JWT_ISSUER").unwrap_or_else(|| DEFAULT_JWT_ISSUER.to_string()),
            }),
            (None, Some(key)) => Some(AuthConfig::ApiKey(key)),
            (None, None) => None,
        };

        let client = ClientConfig {
            base_url,
            auth,
            max_retries: parse_or(
                "ITERABLE_MAX_RETRIES",
                var("ITERABLE_MAX_RETRIES"),
                defaults.max_retries,
                |n| {
                    if n < 1 {
                        anyhow::bail!("ITERABLE_MAX_RETRIES must be at least 1");
                    }
                    Ok(n)
                },
            )?,
            initial_backoff: Duration::from_millis(parse_or(
                "ITERABLE_INITIAL_BACKOFF_MS",
                var("ITERABLE_INITIAL_BACKOFF_MS"),
                defaults.initial_backoff.as_millis() as u64,
                Ok,
            )?),
            backoff_factor: parse_or(
                "ITERABLE_BACKOFF_FACTOR",
                var("ITERABLE_BACKOFF_FACTOR"),
                defaults.backoff_factor,
                |f| {
                    if !f.is_finite() || f < 1.0 {
                        anyhow::bail!("ITERABLE_BACKOFF_FACTOR must be a finite number >= 1.0");
                    }
                    Ok(f)
                },
            )?,
            timeout: Duration::from_secs(parse_or(
                "ITERABLE_TIMEOUT_SECS",
                var("ITERABLE_TIMEOUT_SECS"),
                defaults.timeout.as_secs(),
                |s| {
                    if s == 0 {
                        anyhow::bail!("ITERABLE_TIMEOUT_SECS must be at least 1");
                    }
                    Ok(s)
                },
            )?),
        };

        let config = Self {
            source,
            client,
            results_dir: var("RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Environment variables loaded successfully");
        match &config.source {
            RecordSource::Database { database_url, query } => {
                tracing::debug!(
                    "Database URL: {}...",
                    database_url.chars().take(20).collect::<String>()
                );
                tracing::debug!("Segment query: {:?}", query);
            }
            RecordSource::File(path) => tracing::info!("Reading records from {}", path.display()),
        }
        tracing::debug!("Iterable Base URL: {}", config.client.base_url);
        if config.client.auth.is_none() {
            tracing::warn!("Neither ITERABLE_JWT_SECRET nor ITERABLE_API_KEY is set");
        }

        Ok(config)
    }
}

fn parse_or<T, V>(key: &str, raw: Option<String>, default: T, validate: V) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    V: FnOnce(T) -> anyhow::Result<T>,
{
    match raw {
        Some(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .map_err(|_| anyhow::anyhow!("{} must be a number, got {:?}", key, raw))?;
            validate(value)
        }
        None => Ok(default),
    }
}
