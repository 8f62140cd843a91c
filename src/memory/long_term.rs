//! 长期记忆：跨重启持久化的累计统计
//!
//! 只有置信度达到学习阈值的执行才会写入：总次数、置信度之和，
//! 以及平台 / 创意类型 / 兴趣标签的成功计数。计数单调不减。
//!
//! 后端：InMemoryLongTermStore（测试）、JsonLongTermStore（单文件）、
//! SqliteLongTermStore（事务更新，适合多进程共享）。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::strategy::Strategy;

/// 数值统计
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_executions: u64,
    pub confidence_sum: f64,
}

/// 长期累计统计（JSON 后端的磁盘格式即为此结构）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTermStats {
    #[serde(default)]
    pub global_stats: GlobalStats,
    #[serde(default)]
    pub platform_success: BTreeMap<String, u64>,
    #[serde(default)]
    pub creative_success: BTreeMap<String, u64>,
    #[serde(default)]
    pub interest_success: BTreeMap<String, u64>,
}

impl LongTermStats {
    /// 历史平均置信度；尚无记录时为 None
    pub fn average(&self) -> Option<f64> {
        let stats = &self.global_stats;
        if stats.total_executions == 0 {
            return None;
        }
        Some(stats.confidence_sum / stats.total_executions as f64)
    }

    pub fn apply(&mut self, sample: &SuccessSample) {
        self.global_stats.total_executions += 1;
        self.global_stats.confidence_sum += sample.confidence;
        *self.platform_success.entry(sample.platform.clone()).or_insert(0) += 1;
        *self.creative_success.entry(sample.creative.clone()).or_insert(0) += 1;
        for interest in &sample.interests {
            *self.interest_success.entry(interest.clone()).or_insert(0) += 1;
        }
    }
}

/// 一次成功执行需要写入长期记忆的内容
#[derive(Clone, Debug, PartialEq)]
pub struct SuccessSample {
    pub platform: String,
    pub creative: String,
    pub interests: Vec<String>,
    pub confidence: f64,
}

impl SuccessSample {
    pub fn from_strategy(strategy: &Strategy, confidence: f64) -> Self {
        Self {
            platform: strategy.platform_or_unknown().to_string(),
            creative: strategy.creative_or_unknown().to_string(),
            interests: strategy.interests.clone(),
            confidence,
        }
    }
}

/// 长期记忆后端：读取全部统计，或以原子方式追加一次成功并返回更新后的统计
pub trait LongTermStore: Send + Sync {
    fn load(&self) -> Result<LongTermStats, EngineError>;

    /// 读-改-写必须在单写者约束下完成，不得丢失并发写入
    fn record_success(&self, sample: &SuccessSample) -> Result<LongTermStats, EngineError>;

    /// 存储位置描述（日志用）
    fn location(&self) -> String;
}

/// 纯内存实现：进程退出即丢失
#[derive(Debug, Default)]
pub struct InMemoryLongTermStore {
    stats: Mutex<LongTermStats>,
}

impl InMemoryLongTermStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(stats: LongTermStats) -> Self {
        Self {
            stats: Mutex::new(stats),
        }
    }
}

impl LongTermStore for InMemoryLongTermStore {
    fn load(&self) -> Result<LongTermStats, EngineError> {
        let stats = self.stats.lock().map_err(|_| poisoned())?;
        Ok(stats.clone())
    }

    fn record_success(&self, sample: &SuccessSample) -> Result<LongTermStats, EngineError> {
        let mut stats = self.stats.lock().map_err(|_| poisoned())?;
        stats.apply(sample);
        Ok(stats.clone())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// 单文件 JSON 实现
///
/// 进程内写者由互斥锁串行化；每次更新前重新读盘，写入时先写临时文件再 rename。
#[derive(Debug)]
pub struct JsonLongTermStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLongTermStore {
    /// 打开存储；文件不存在时创建空统计文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        };
        if !store.path.exists() {
            store.write(&LongTermStats::default())?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<LongTermStats, EngineError> {
        if !self.path.exists() {
            return Ok(LongTermStats::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(LongTermStats::default());
        }
        Ok(serde_json::from_str(&data)?)
    }

    fn write(&self, stats: &LongTermStats) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(stats)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LongTermStore for JsonLongTermStore {
    fn load(&self) -> Result<LongTermStats, EngineError> {
        self.read()
    }

    fn record_success(&self, sample: &SuccessSample) -> Result<LongTermStats, EngineError> {
        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;
        let mut stats = self.read()?;
        stats.apply(sample);
        self.write(&stats)?;
        Ok(stats)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn poisoned() -> EngineError {
    EngineError::Memory("long-term store lock poisoned".to_string())
}
