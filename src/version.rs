//! Component 1 — Version Counter.
//!
//! A single monotone integer persisted in `version_counter` (row `id = 0`).
//! Allocation happens inside the same `rusqlite::Transaction` as the
//! observation write it accompanies, so a rolled-back transaction never
//! consumes a version (spec §4.1, §8).

use rusqlite::Transaction;

use crate::error::Result;

/// Allocates the next server version inside `tx`. The caller commits or
/// rolls back `tx`; if it rolls back, this allocation is undone with it.
pub fn allocate_next_version(tx: &Transaction<'_>) -> Result<i64> {
    let value: i64 = tx.query_row(
        "UPDATE version_counter SET value = value + 1 WHERE id = 0 RETURNING value",
        [],
        |row| row.get(0),
    )?;
    Ok(value)
}

/// Reads the current committed counter value without allocating.
pub fn current_version(tx: &Transaction<'_>) -> Result<i64> {
    let value: i64 = tx.query_row(
        "SELECT value FROM version_counter WHERE id = 0",
        [],
        |row| row.get(0),
    )?;
    Ok(value)
}
