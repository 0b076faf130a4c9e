//! Database initialization
//!
//! Opens (or creates) the SQLite store and makes sure every table the
//! sampler reads or writes exists. Schema creation is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open the database file, creating it and its tables if needed
pub async fn init_database(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL lets the sync/tick readers proceed while a flush transaction writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_theaters_table(pool).await?;
    create_screens_table(pool).await?;
    create_movies_table(pool).await?;
    create_showings_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores runtime overrides as key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_theaters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS theaters (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT,
            api_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_screens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS screens (
            id INTEGER PRIMARY KEY,
            theater_id INTEGER NOT NULL REFERENCES theaters(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            seat_count INTEGER NOT NULL CHECK (seat_count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_screens_theater ON screens(theater_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_movies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS movies (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the showings table
///
/// `seats_sold`/`sampled_at` and `screen_id` are the sampler-owned columns.
async fn create_showings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS showings (
            id INTEGER PRIMARY KEY,
            movie_id INTEGER NOT NULL REFERENCES movies(id),
            theater_id INTEGER NOT NULL REFERENCES theaters(id),
            starts_at INTEGER NOT NULL,
            provider TEXT,
            detail_url TEXT,
            screen_id INTEGER REFERENCES screens(id),
            seats_sold INTEGER,
            sampled_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_showings_starts_at ON showings(starts_at)")
        .execute(pool)
        .await?;

    Ok(())
}
