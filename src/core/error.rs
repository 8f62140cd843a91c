//! 引擎错误类型
//!
//! 业务上的拦截（NoWinner / 比较不确定 / 低置信度）不是错误，而是 `Verdict::Blocked`；
//! 这里只包含输入契约违规与外部依赖失败。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// 输入契约违规（如比较器收到少于 2 条候选）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 生成器失败且无可用的降级候选
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Generation timed out after {0}s")]
    GenerationTimeout(u64),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// 分析步骤找不到满足显著性要求的细分人群
    #[error("Insufficient data: {0}")]
    Analysis(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl EngineError {
    /// 生成器侧的失败（含超时）
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            EngineError::Generation(_) | EngineError::GenerationTimeout(_)
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(e: config::ConfigError) -> Self {
        EngineError::Config(e.to_string())
    }
}
