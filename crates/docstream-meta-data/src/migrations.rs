//! Embedded schema migrations

use crate::error::{DatabaseError, DatabaseResult};
use sqlx::PgPool;

/// Apply all pending migrations
///
/// # Errors
///
/// Returns an error if a migration fails to apply or the migration table
/// cannot be created.
pub async fn run_migrations(pool: &PgPool) -> DatabaseResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(format!("migration failed: {e}")))
}
