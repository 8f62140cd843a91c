//! SQLite 长期记忆后端
//!
//! 每次累加都在 IMMEDIATE 事务内完成：多个进程共享同一数据库文件时，
//! 写者互斥，计数不会丢失。

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, TransactionBehavior};

use crate::core::EngineError;
use crate::memory::long_term::{LongTermStats, LongTermStore, SuccessSample};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteLongTermStore {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteLongTermStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::from_connection(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn from_connection(conn: Connection, location: String) -> Result<Self, EngineError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS global_stats (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                total_executions INTEGER NOT NULL DEFAULT 0,
                confidence_sum REAL NOT NULL DEFAULT 0
            );
            INSERT OR IGNORE INTO global_stats (id, total_executions, confidence_sum)
                VALUES (1, 0, 0);
            CREATE TABLE IF NOT EXISTS success_tallies (
                kind TEXT NOT NULL,
                key TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (kind, key)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }
}

fn read_stats(conn: &Connection) -> Result<LongTermStats, rusqlite::Error> {
    let mut stats = LongTermStats::default();
    let (total, sum): (i64, f64) = conn.query_row(
        "SELECT total_executions, confidence_sum FROM global_stats WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    stats.global_stats.total_executions = total.max(0) as u64;
    stats.global_stats.confidence_sum = sum;

    let mut stmt = conn.prepare("SELECT kind, key, count FROM success_tallies")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (kind, key, count) = row?;
        let tally = match kind.as_str() {
            "platform" => &mut stats.platform_success,
            "creative" => &mut stats.creative_success,
            "interest" => &mut stats.interest_success,
            _ => continue,
        };
        tally.insert(key, count.max(0) as u64);
    }
    Ok(stats)
}

fn bump(conn: &Connection, kind: &str, key: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO success_tallies (kind, key, count) VALUES (?1, ?2, 1)
         ON CONFLICT(kind, key) DO UPDATE SET count = count + 1",
        params![kind, key],
    )?;
    Ok(())
}

impl LongTermStore for SqliteLongTermStore {
    fn load(&self) -> Result<LongTermStats, EngineError> {
        let conn = self.conn.lock().map_err(|_| poisoned())?;
        Ok(read_stats(&conn)?)
    }

    fn record_success(&self, sample: &SuccessSample) -> Result<LongTermStats, EngineError> {
        let mut conn = self.conn.lock().map_err(|_| poisoned())?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "UPDATE global_stats
             SET total_executions = total_executions + 1,
                 confidence_sum = confidence_sum + ?1
             WHERE id = 1",
            params![sample.confidence],
        )?;
        bump(&tx, "platform", &sample.platform)?;
        bump(&tx, "creative", &sample.creative)?;
        for interest in &sample.interests {
            bump(&tx, "interest", interest)?;
        }
        let stats = read_stats(&tx)?;
        tx.commit()?;
        Ok(stats)
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

fn poisoned() -> EngineError {
    EngineError::Memory("sqlite connection lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(confidence: f64) -> SuccessSample {
        SuccessSample {
            platform: "google_ads".to_string(),
            creative: "search".to_string(),
            interests: vec!["finance".to_string()],
            confidence,
        }
    }

    #[test]
    fn test_in_memory_roundtrip() {
        let store = SqliteLongTermStore::open_in_memory().unwrap();
        assert_eq!(store.load().unwrap(), LongTermStats::default());
        store.record_success(&sample(0.8)).unwrap();
        let stats = store.record_success(&sample(0.9)).unwrap();
        assert_eq!(stats.global_stats.total_executions, 2);
        assert!((stats.average().unwrap() - 0.85).abs() < 1e-9);
        assert_eq!(stats.platform_success["google_ads"], 2);
        assert_eq!(stats.interest_success["finance"], 2);
    }

    #[test]
    fn test_two_handles_share_one_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.db");
        let a = SqliteLongTermStore::open(&path).unwrap();
        let b = SqliteLongTermStore::open(&path).unwrap();

        a.record_success(&sample(0.7)).unwrap();
        b.record_success(&sample(0.9)).unwrap();
        a.record_success(&sample(0.8)).unwrap();

        let stats = b.load().unwrap();
        assert_eq!(stats.global_stats.total_executions, 3);
        assert_eq!(stats.creative_success["search"], 3);
    }
}
