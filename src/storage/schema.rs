//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY,
            time TEXT NOT NULL,
            status TEXT NOT NULL,
            count INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS anomalies (
            id INTEGER PRIMARY KEY,
            time TEXT NOT NULL,
            status TEXT NOT NULL,
            count INTEGER NOT NULL,
            level TEXT NOT NULL,
            score REAL NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS baselines (
            id INTEGER PRIMARY KEY,
            hour INTEGER NOT NULL,
            status TEXT NOT NULL,
            mean REAL NOT NULL,
            std REAL NOT NULL,
            mad REAL NOT NULL,
            p95 REAL NOT NULL,
            p99 REAL NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_time ON transactions(time);
        CREATE INDEX IF NOT EXISTS idx_anomalies_created ON anomalies(created_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_baselines_key ON baselines(hour, status);",
    )?;
    Ok(())
}
