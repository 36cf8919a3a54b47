use crate::errors::{AppError, ResultExt};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Connection pool for the customer database. A run uses a single worker, so
/// the pool stays small.
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .context("Error connecting to database")?;

        // Fail fast on a reachable but unusable database
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .context("Database health check failed")?;

        tracing::info!("Successfully connected to database");
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database connection closed");
    }
}
