//! 记忆协调者：组合短期窗口与长期统计，对外提供只读快照
//!
//! 进程启动时构造一次，以 `Arc<MemoryAgent>` 传入编排器；所有写入经由内部互斥锁串行化。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::memory::long_term::{InMemoryLongTermStore, LongTermStore, SuccessSample};
use crate::memory::short_term::{ExecutionRecord, ShortTermMemory, DEFAULT_SHORT_TERM_CAPACITY};

/// 快照结构版本；字段变化时递增
pub const SNAPSHOT_VERSION: u32 = 1;

/// 达到此执行数后进入 stable 模式
pub const STABLE_EXECUTIONS: u64 = 5;

/// 记忆写入与快照相关的阈值
#[derive(Clone, Debug)]
pub struct MemoryPolicy {
    /// 置信度达到此值才写入长期统计
    pub learning_threshold: f64,
    /// 窗口内「失败 / 通过」的分界
    pub acceptance_threshold: f64,
    /// 尚无历史时的平均置信度（中性先验，非观测值）
    pub neutral_prior: f64,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            learning_threshold: 0.7,
            acceptance_threshold: 0.6,
            neutral_prior: 0.6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    ColdStart,
    Learning,
    Stable,
}

/// 记忆快照：策略规则只读取命名字段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub version: u32,
    pub executions_count: u64,
    pub historical_confidence_avg: f64,
    /// 从旧到新，长度不超过短期窗口容量
    pub recent_confidences: Vec<f64>,
    pub recent_avg_confidence: Option<f64>,
    pub recent_failures: usize,
    pub approved_rate: f64,
    pub mode: MemoryMode,
    pub platform_success: BTreeMap<String, u64>,
    pub creative_success: BTreeMap<String, u64>,
    pub interest_success: BTreeMap<String, u64>,
}

impl MemorySnapshot {
    /// 全新进程、无任何历史时的快照
    pub fn empty(neutral_prior: f64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            executions_count: 0,
            historical_confidence_avg: neutral_prior,
            recent_confidences: Vec::new(),
            recent_avg_confidence: None,
            recent_failures: 0,
            approved_rate: 0.0,
            mode: MemoryMode::ColdStart,
            platform_success: BTreeMap::new(),
            creative_success: BTreeMap::new(),
            interest_success: BTreeMap::new(),
        }
    }

    /// 近期置信度极差（max - min）；窗口为空时为 None
    pub fn recent_spread(&self) -> Option<f64> {
        let max = self.recent_confidences.iter().copied().reduce(f64::max)?;
        let min = self.recent_confidences.iter().copied().reduce(f64::min)?;
        Some(max - min)
    }
}

pub struct MemoryAgent {
    short_term: Mutex<ShortTermMemory>,
    store: Arc<dyn LongTermStore>,
    policy: MemoryPolicy,
}

impl MemoryAgent {
    /// 打开长期存储并创建空的短期窗口
    pub fn open(
        store: Arc<dyn LongTermStore>,
        short_term_capacity: usize,
        policy: MemoryPolicy,
    ) -> Result<Self, EngineError> {
        let long_term = store.load()?;
        tracing::info!(
            "Long-term memory loaded from {} ({} executions)",
            store.location(),
            long_term.global_stats.total_executions
        );
        Ok(Self {
            short_term: Mutex::new(ShortTermMemory::new(short_term_capacity)),
            store,
            policy,
        })
    }

    /// 纯内存记忆（测试与离线演示）
    pub fn in_memory() -> Self {
        Self {
            short_term: Mutex::new(ShortTermMemory::new(DEFAULT_SHORT_TERM_CAPACITY)),
            store: Arc::new(InMemoryLongTermStore::new()),
            policy: MemoryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MemoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &MemoryPolicy {
        &self.policy
    }

    fn lock(&self) -> Result<MutexGuard<'_, ShortTermMemory>, EngineError> {
        self.short_term
            .lock()
            .map_err(|_| EngineError::Memory("memory state lock poisoned".to_string()))
    }

    /// 追加一次执行：置信度达到学习阈值时先写入长期统计，成功后才进入短期窗口；
    /// 长期写入失败时两层都保持不变
    pub fn record(&self, record: ExecutionRecord) -> Result<(), EngineError> {
        let mut short_term = self.lock()?;
        let confidence = record.confidence();

        if confidence >= self.policy.learning_threshold {
            let sample = SuccessSample::from_strategy(&record.strategy, confidence);
            let stats = self.store.record_success(&sample)?;
            tracing::debug!(
                "Execution learned (confidence {:.2}, total {})",
                confidence,
                stats.global_stats.total_executions
            );
        } else {
            tracing::debug!(
                "Execution kept short-term only (confidence {:.2} < {:.2})",
                confidence,
                self.policy.learning_threshold
            );
        }

        short_term.push(record);
        Ok(())
    }

    /// 当前记忆快照；长期统计每次从存储重新读取，共享存储上其他进程的写入也可见
    pub fn context(&self) -> Result<MemorySnapshot, EngineError> {
        let short_term = self.lock()?;
        let long_term = self.store.load()?;
        let executions_count = long_term.global_stats.total_executions;
        let mode = match executions_count {
            0 => MemoryMode::ColdStart,
            n if n < STABLE_EXECUTIONS => MemoryMode::Learning,
            _ => MemoryMode::Stable,
        };

        Ok(MemorySnapshot {
            version: SNAPSHOT_VERSION,
            executions_count,
            historical_confidence_avg: long_term.average().unwrap_or(self.policy.neutral_prior),
            recent_confidences: short_term.confidences(),
            recent_avg_confidence: short_term.average(),
            recent_failures: short_term.failures_below(self.policy.acceptance_threshold),
            approved_rate: short_term.approved_rate(self.policy.acceptance_threshold),
            mode,
            platform_success: long_term.platform_success,
            creative_success: long_term.creative_success,
            interest_success: long_term.interest_success,
        })
    }

    /// 短期窗口内的执行记录（从旧到新），用于审计
    pub fn recent_records(&self) -> Result<Vec<ExecutionRecord>, EngineError> {
        Ok(self.lock()?.records().cloned().collect())
    }
}
