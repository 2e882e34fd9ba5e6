//! Database module
//!
//! Database connection and migration utilities.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::time::Duration;

/// Schema applied at startup; every statement is idempotent
const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// Tables the store adapter needs
const REQUIRED_TABLES: &[&str] = &["accounts", "orders"];

/// Connect to Postgres, retrying with a growing delay.
///
/// `attempts` counts the first try; the last error is returned once the
/// budget is spent.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    attempts: u32,
) -> Result<PgPool, sqlx::Error> {
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < attempts => {
                let delay = Duration::from_secs(u64::from(attempt));
                tracing::warn!(
                    error = %e,
                    "Database connection failed, retrying (attempt {}/{})",
                    attempt,
                    attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Apply the bundled schema
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(SCHEMA).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(*table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
