//! 策略仓库：campaign_strategies 表
//!
//! 新策略以 PENDING 状态写入，供下游执行方拾取；模拟反馈写回后状态变为 SIMULATED_FEEDBACK。

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::persistence::feedback::{simulate_feedback, SimulatedFeedback};
use crate::strategy::Strategy;

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_SIMULATED_FEEDBACK: &str = "SIMULATED_FEEDBACK";

/// save 的返回：记录 id 与初始状态
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedStrategy {
    pub id: i64,
    pub status: String,
}

/// 从仓库读回的完整记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredStrategy {
    pub id: i64,
    pub campaign_name: String,
    pub status: String,
    pub strategy: Strategy,
    pub created_at: DateTime<Utc>,
    pub feedback: Option<SimulatedFeedback>,
}

/// 持久化接口（仅在批准后调用）
pub trait StrategyRepository: Send + Sync {
    fn save(&self, strategy: &Strategy, campaign_name: &str) -> Result<SavedStrategy, EngineError>;

    fn get(&self, id: i64) -> Result<Option<StoredStrategy>, EngineError>;

    fn record_feedback(&self, id: i64, feedback: &SimulatedFeedback) -> Result<(), EngineError>;

    /// 根据已存策略的行为指标模拟反馈并写回
    fn simulate_feedback(&self, id: i64) -> Result<SimulatedFeedback, EngineError> {
        let stored = self
            .get(id)?
            .ok_or_else(|| EngineError::Persistence(format!("strategy {} not found", id)))?;
        let feedback = simulate_feedback(&stored.strategy.behavior);
        self.record_feedback(id, &feedback)?;
        Ok(feedback)
    }
}

fn db_error(e: rusqlite::Error) -> EngineError {
    EngineError::Persistence(e.to_string())
}

pub struct SqliteStrategyRepository {
    conn: Mutex<Connection>,
}

impl SqliteStrategyRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path).map_err(db_error)?)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::init(Connection::open_in_memory().map_err(db_error)?)
    }

    fn init(conn: Connection) -> Result<Self, EngineError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS campaign_strategies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_name TEXT NOT NULL,
                target_profile_description TEXT,
                keywords TEXT NOT NULL DEFAULT '[]',
                message_template TEXT,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                created_at TEXT NOT NULL,
                total_leads INTEGER,
                feedback TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_strategies_status ON campaign_strategies(status);
            CREATE INDEX IF NOT EXISTS idx_strategies_name ON campaign_strategies(campaign_name);",
        )
        .map_err(db_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EngineError> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Persistence("repository lock poisoned".to_string()))
    }
}

impl StrategyRepository for SqliteStrategyRepository {
    fn save(&self, strategy: &Strategy, campaign_name: &str) -> Result<SavedStrategy, EngineError> {
        let keywords = serde_json::to_string(&strategy.keywords)?;
        let payload = serde_json::to_string(strategy)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO campaign_strategies
                (campaign_name, target_profile_description, keywords, message_template, payload, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                campaign_name,
                strategy.target_audience,
                keywords,
                strategy.message_template,
                payload,
                STATUS_PENDING,
                Utc::now(),
            ],
        )
        .map_err(db_error)?;
        Ok(SavedStrategy {
            id: conn.last_insert_rowid(),
            status: STATUS_PENDING.to_string(),
        })
    }

    fn get(&self, id: i64) -> Result<Option<StoredStrategy>, EngineError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT campaign_name, status, payload, created_at, feedback
                 FROM campaign_strategies WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, DateTime<Utc>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(db_error)?;

        let Some((campaign_name, status, payload, created_at, feedback)) = row else {
            return Ok(None);
        };
        let feedback = match feedback {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(Some(StoredStrategy {
            id,
            campaign_name,
            status,
            strategy: serde_json::from_str(&payload)?,
            created_at,
            feedback,
        }))
    }

    fn record_feedback(&self, id: i64, feedback: &SimulatedFeedback) -> Result<(), EngineError> {
        let json = serde_json::to_string(feedback)?;
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE campaign_strategies SET total_leads = ?1, feedback = ?2, status = ?3 WHERE id = ?4",
                params![feedback.total_leads as i64, json, STATUS_SIMULATED_FEEDBACK, id],
            )
            .map_err(db_error)?;
        if updated == 0 {
            return Err(EngineError::Persistence(format!("strategy {} not found", id)));
        }
        Ok(())
    }
}
