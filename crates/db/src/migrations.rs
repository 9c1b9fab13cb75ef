use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of the named tables that exist in the connected database.
pub async fn count_tables(pool: &DbPool, names: &[&str]) -> Result<i64, sqlx::Error> {
    let mut found = 0;
    for name in names {
        found += sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await?;
    }
    Ok(found)
}
