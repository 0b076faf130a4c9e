//! Instrumented transactions
//!
//! Flush holds one transaction for a whole batch; these wrappers log how
//! long the connection was waited for and held so slow commits show up in
//! the logs.

use seatwatch_common::{Error, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::time::Instant;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    fn new(tx: Transaction<'c, Sqlite>, caller: &'static str, acquired_at: Instant) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at,
        }
    }

    /// Commit the transaction and log how long it was held
    pub async fn commit(mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("transaction already finished".to_string()))?;

        tx.commit().await?;

        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms = held_ms,
                "Long transaction: connection held for extended period"
            );
        } else {
            tracing::debug!(
                caller = self.caller,
                held_ms = held_ms,
                "Connection released (commit)"
            );
        }

        Ok(())
    }

    /// Roll the transaction back and log how long it was held
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("transaction already finished".to_string()))?;

        tx.rollback().await?;

        tracing::debug!(
            caller = self.caller,
            held_ms = self.acquired_at.elapsed().as_millis(),
            "Connection released (rollback)"
        );

        Ok(())
    }

    /// Mutable access to the inner transaction
    pub fn inner_mut(&mut self) -> &mut Transaction<'c, Sqlite> {
        // Only `commit`/`rollback` take the transaction, and both consume self
        self.tx.as_mut().expect("transaction present until commit/rollback")
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls the transaction back when it is dropped
            tracing::warn!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Transaction dropped without commit, rolled back"
            );
        }
    }
}

/// Begin a transaction with connection timing logs
pub async fn begin_monitored<'c>(
    pool: &'c SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();

    tracing::trace!(caller = caller, "Connection acquisition requested");

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(
            caller = caller,
            wait_ms = wait_ms,
            "Slow connection acquisition: pool may be saturated"
        );
    } else {
        tracing::debug!(caller = caller, wait_ms = wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction::new(tx, caller, Instant::now()))
}
