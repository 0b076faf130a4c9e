//! Key/value access to the `settings` table

use crate::Result;
use sqlx::SqlitePool;

/// Read a setting; `None` when the key is missing or NULL
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.flatten())
}

/// Insert or replace a setting
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::create_schema;

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_missing_setting_is_none() {
        let pool = test_pool().await;
        assert_eq!(get_setting(&pool, "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let pool = test_pool().await;
        set_setting(&pool, "sampler_tick_interval_secs", "20").await.unwrap();
        set_setting(&pool, "sampler_tick_interval_secs", "30").await.unwrap();
        assert_eq!(
            get_setting(&pool, "sampler_tick_interval_secs").await.unwrap(),
            Some("30".to_string())
        );
    }
}
