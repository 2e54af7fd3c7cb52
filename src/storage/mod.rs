//! SQLite storage layer -- schema, queries, migrations.

pub mod schema;

use anyhow::Result;
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::warn;

use crate::detect::baseline::BaselineEntry;
use crate::model::{AlertLevel, AnomalyRecord, Observation, TransactionStatus};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Persist a batch of observations.
pub fn save_observations(pool: &Pool, batch: &[Observation]) -> Result<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO transactions (time, status, count) VALUES (?1, ?2, ?3)")?;
        for obs in batch {
            stmt.execute(params![obs.time, obs.status.as_str(), obs.count])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Load the full stored history, oldest first.
///
/// Rows with a status string the current build does not know are logged
/// and skipped rather than failing the load.
pub fn load_observations(pool: &Pool) -> Result<Vec<Observation>> {
    query_observations(pool, None, None, None)
}

/// Load stored observations filtered by bucket range and status.
pub fn query_observations(
    pool: &Pool,
    start: Option<&str>,
    end: Option<&str>,
    status: Option<TransactionStatus>,
) -> Result<Vec<Observation>> {
    let conn = pool.get()?;
    let mut sql = String::from("SELECT time, status, count FROM transactions WHERE 1=1");
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(start) = start {
        sql.push_str(&format!(" AND time >= ?{}", args.len() + 1));
        args.push(Box::new(start.to_string()));
    }
    if let Some(end) = end {
        sql.push_str(&format!(" AND time <= ?{}", args.len() + 1));
        args.push(Box::new(end.to_string()));
    }
    if let Some(status) = status {
        sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
        args.push(Box::new(status.as_str().to_string()));
    }
    sql.push_str(" ORDER BY time ASC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut out = Vec::new();
    for r in rows {
        let (time, status_str, count) = r?;
        match TransactionStatus::parse(&status_str) {
            Some(status) => out.push(Observation {
                time,
                status,
                count: count.max(0) as u64,
            }),
            None => warn!(status = %status_str, "skipping stored row with unknown status"),
        }
    }
    Ok(out)
}

/// Persist detected anomaly records.
pub fn save_anomalies(pool: &Pool, records: &[AnomalyRecord]) -> Result<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO anomalies (time, status, count, level, score, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for rec in records {
            stmt.execute(params![
                rec.time,
                rec.status.as_str(),
                rec.count,
                rec.level.as_str(),
                rec.score,
                rec.message
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Most recent anomaly records, newest first.
pub fn list_recent_anomalies(pool: &Pool, limit: usize) -> Result<Vec<AnomalyRecord>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT time, status, count, level, score, message FROM anomalies
         ORDER BY id DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map([limit as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut out = Vec::new();
    for r in rows {
        let (time, status_str, count, level_str, score, message) = r?;
        let Some(status) = TransactionStatus::parse(&status_str) else {
            warn!(status = %status_str, "skipping stored anomaly with unknown status");
            continue;
        };
        let level = match level_str.as_str() {
            "CRITICAL" => AlertLevel::Critical,
            _ => AlertLevel::Warning,
        };
        out.push(AnomalyRecord {
            time,
            status,
            count: count.max(0) as u64,
            level,
            score,
            message,
        });
    }
    Ok(out)
}

/// Replace the persisted baseline table with a fresh set of entries.
pub fn replace_baselines(pool: &Pool, entries: &[BaselineEntry]) -> Result<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM baselines", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO baselines (hour, status, mean, std, mad, p95, p99)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for e in entries {
            stmt.execute(params![
                e.hour,
                e.status.as_str(),
                e.mean,
                e.std,
                e.mad,
                e.p95,
                e.p99
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionStatus;

    fn test_pool() -> (tempfile::TempDir, Pool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = open_pool(path.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    fn obs(time: &str, status: TransactionStatus, count: u64) -> Observation {
        Observation {
            time: time.to_string(),
            status,
            count,
        }
    }

    #[test]
    fn test_observation_roundtrip_and_filters() {
        let (_dir, pool) = test_pool();
        save_observations(
            &pool,
            &[
                obs("00h 00", TransactionStatus::Approved, 100),
                obs("00h 30", TransactionStatus::Failed, 7),
                obs("01h 00", TransactionStatus::Failed, 9),
            ],
        )
        .unwrap();

        let all = load_observations(&pool).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].time, "00h 00");

        let failed =
            query_observations(&pool, None, None, Some(TransactionStatus::Failed)).unwrap();
        assert_eq!(failed.len(), 2);

        let windowed = query_observations(&pool, Some("00h 10"), Some("00h 59"), None).unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].count, 7);
    }

    #[test]
    fn test_anomaly_roundtrip() {
        let (_dir, pool) = test_pool();
        let rec = AnomalyRecord {
            time: "02h 15".to_string(),
            status: TransactionStatus::Denied,
            count: 44,
            level: AlertLevel::Critical,
            score: 5.5,
            message: "count 44 above p99".to_string(),
        };
        save_anomalies(&pool, &[rec.clone()]).unwrap();

        let listed = list_recent_anomalies(&pool, 10).unwrap();
        assert_eq!(listed, vec![rec]);
    }

    #[test]
    fn test_replace_baselines_overwrites() {
        let (_dir, pool) = test_pool();
        let entry = BaselineEntry {
            hour: 3,
            status: TransactionStatus::Failed,
            mean: 10.0,
            std: 2.0,
            mad: 9.0,
            p95: 14.0,
            p99: 18.0,
        };
        replace_baselines(&pool, &[entry.clone()]).unwrap();
        replace_baselines(&pool, &[entry]).unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM baselines", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
