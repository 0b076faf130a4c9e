//! Showing and screen queries used by the stages
//!
//! The two sampler-owned columns are only written through the conditional
//! updates at the bottom of this file:
//! - `seats_sold` changes only when the new value differs (`IS NOT`)
//! - `screen_id` is set only while it is still NULL

use seatwatch_common::db::{Screen, ShowEvent};
use seatwatch_common::Result;
use sqlx::{Executor, Sqlite, SqlitePool};

const SHOW_EVENT_COLUMNS: &str = r#"
    s.id AS id,
    s.movie_id AS movie_id,
    m.title AS movie_title,
    s.theater_id AS theater_id,
    t.name AS theater_name,
    t.url AS theater_url,
    s.starts_at AS starts_at,
    s.provider AS provider,
    s.detail_url AS detail_url,
    s.screen_id AS screen_id,
    s.seats_sold AS seats_sold
"#;

/// Showings starting in `[from, to]` (Unix seconds) still missing seats sold
pub async fn pending_showings(pool: &SqlitePool, from: i64, to: i64) -> Result<Vec<ShowEvent>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM showings s
        JOIN theaters t ON t.id = s.theater_id
        LEFT JOIN movies m ON m.id = s.movie_id
        WHERE s.starts_at BETWEEN ? AND ?
          AND s.seats_sold IS NULL
        ORDER BY s.starts_at, s.id
        "#,
        SHOW_EVENT_COLUMNS
    );

    let rows = sqlx::query_as::<_, ShowEvent>(&sql)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Showings without a screen that have a detail URL and start at or after `not_before`
pub async fn unassigned_showings(pool: &SqlitePool, not_before: i64) -> Result<Vec<ShowEvent>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM showings s
        JOIN theaters t ON t.id = s.theater_id
        LEFT JOIN movies m ON m.id = s.movie_id
        WHERE s.screen_id IS NULL
          AND s.detail_url IS NOT NULL
          AND s.starts_at >= ?
        ORDER BY s.starts_at, s.id
        "#,
        SHOW_EVENT_COLUMNS
    );

    let rows = sqlx::query_as::<_, ShowEvent>(&sql)
        .bind(not_before)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Screens of one venue, ordered by id
pub async fn screens_for_theater<'e, E>(executor: E, theater_id: i64) -> Result<Vec<Screen>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let screens = sqlx::query_as::<_, Screen>(
        "SELECT id, theater_id, name, seat_count FROM screens WHERE theater_id = ? ORDER BY id",
    )
    .bind(theater_id)
    .fetch_all(executor)
    .await?;

    Ok(screens)
}

/// Distinct seat counts configured for a venue, largest first
pub async fn distinct_capacities(pool: &SqlitePool, theater_id: i64) -> Result<Vec<i64>> {
    let capacities = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT seat_count FROM screens WHERE theater_id = ? ORDER BY seat_count DESC",
    )
    .bind(theater_id)
    .fetch_all(pool)
    .await?;

    Ok(capacities)
}

/// Screen currently assigned to a showing
pub async fn assigned_screen<'e, E>(executor: E, show_id: i64) -> Result<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let screen_id: Option<Option<i64>> =
        sqlx::query_scalar("SELECT screen_id FROM showings WHERE id = ?")
            .bind(show_id)
            .fetch_optional(executor)
            .await?;

    Ok(screen_id.flatten())
}

/// Set seats sold unless it already holds `seats_sold`; returns rows changed
pub async fn update_seats_sold<'e, E>(
    executor: E,
    show_id: i64,
    seats_sold: i64,
    sampled_at: i64,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE showings
        SET seats_sold = ?, sampled_at = ?
        WHERE id = ? AND seats_sold IS NOT ?
        "#,
    )
    .bind(seats_sold)
    .bind(sampled_at)
    .bind(show_id)
    .bind(seats_sold)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Assign a screen only while none is set; returns rows changed
///
/// With `not_before`, showings that started before that instant are left alone.
pub async fn assign_screen_once<'e, E>(
    executor: E,
    show_id: i64,
    screen_id: i64,
    not_before: Option<i64>,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE showings
        SET screen_id = ?
        WHERE id = ?
          AND screen_id IS NULL
          AND (? IS NULL OR starts_at >= ?)
        "#,
    )
    .bind(screen_id)
    .bind(show_id)
    .bind(not_before)
    .bind(not_before)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
