//! Schema migration runner.
//!
//! Schema migrations themselves live as plain SQL files; this just wraps
//! `sqlx::migrate!` so the broker can bootstrap its own schema on a fresh
//! database the way the rest of the workspace wraps its infrastructure
//! concerns.

use sqlx::PgPool;

use slurpee_core::error::{Error, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Apply all pending migrations, in order, to the given pool.
pub async fn run(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| Error::database_with_source("migration failed", e))
}
