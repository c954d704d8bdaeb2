//! Database pool and schema bootstrap
//!
//! Entities are stored as JSON documents alongside their natural-key columns,
//! which are what the synchronization queries filter and sort on. The
//! document column is the source of truth; the key columns are kept in step
//! on every save.

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool against a file, creating it if missing
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Initialize an in-memory pool with the full schema, for tests
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePool::connect(":memory:").await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the synchronization tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lsm_image (
            guid TEXT PRIMARY KEY,
            owner_key TEXT NOT NULL,
            sage_id INTEGER NOT NULL,
            sage_synced INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            document TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lsm_image_sage_id ON lsm_image (owner_key, sage_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sample (
            guid TEXT PRIMARY KEY,
            owner_key TEXT NOT NULL,
            data_set TEXT NOT NULL,
            slide_code TEXT NOT NULL,
            sage_synced INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            document TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sample_slide_code ON sample (owner_key, data_set, slide_code)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data_set (
            identifier TEXT PRIMARY KEY,
            owner_key TEXT NOT NULL,
            document TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS status_transition (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sample_guid TEXT NOT NULL,
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            order_no TEXT,
            process TEXT,
            note TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (lsm_image, sample, data_set, status_transition)");
    Ok(())
}
