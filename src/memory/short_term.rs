//! 短期记忆：最近 N 次执行记录（固定容量 FIFO）
//!
//! 仅在进程生命周期内有效，重启即清空；用于检测近期置信度波动。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::{ComparisonOutcome, Score};
use crate::strategy::Strategy;

pub const DEFAULT_SHORT_TERM_CAPACITY: usize = 10;

/// 单次编排运行的执行记录；写入记忆后不再修改
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub strategy: Strategy,
    pub score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonOutcome>,
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(strategy: Strategy, score: Score, comparison: Option<ComparisonOutcome>) -> Self {
        Self {
            strategy,
            score,
            comparison,
            recorded_at: Utc::now(),
        }
    }

    pub fn confidence(&self) -> f64 {
        self.score.confidence
    }
}

/// 最近执行窗口：超出容量时淘汰最旧的记录
#[derive(Clone, Debug)]
pub struct ShortTermMemory {
    records: VecDeque<ExecutionRecord>,
    capacity: usize,
}

impl Default for ShortTermMemory {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_TERM_CAPACITY)
    }
}

impl ShortTermMemory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// 从旧到新
    pub fn records(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter()
    }

    /// 从旧到新的置信度序列
    pub fn confidences(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.confidence()).collect()
    }

    pub fn average(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let sum: f64 = self.records.iter().map(|r| r.confidence()).sum();
        Some(sum / self.records.len() as f64)
    }

    /// 窗口内低于 threshold 的次数
    pub fn failures_below(&self, threshold: f64) -> usize {
        self.records
            .iter()
            .filter(|r| r.confidence() < threshold)
            .count()
    }

    /// 窗口内达到 threshold 的比例；空窗口为 0
    pub fn approved_rate(&self, threshold: f64) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let approved = self.records.len() - self.failures_below(threshold);
        approved as f64 / self.records.len() as f64
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(confidence: f64) -> ExecutionRecord {
        ExecutionRecord::new(
            Strategy::default(),
            Score::new(confidence, vec![], Utc::now()),
            None,
        )
    }

    #[test]
    fn test_fifo_eviction_keeps_newest() {
        let mut mem = ShortTermMemory::new(3);
        for c in [0.1, 0.2, 0.3, 0.4, 0.5] {
            mem.push(record(c));
        }
        assert_eq!(mem.len(), 3);
        assert_eq!(mem.confidences(), vec![0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_zero_capacity_is_bumped_to_one() {
        let mut mem = ShortTermMemory::new(0);
        mem.push(record(0.9));
        mem.push(record(0.8));
        assert_eq!(mem.capacity(), 1);
        assert_eq!(mem.confidences(), vec![0.8]);
    }

    #[test]
    fn test_window_statistics() {
        let mut mem = ShortTermMemory::default();
        assert_eq!(mem.average(), None);
        assert_eq!(mem.approved_rate(0.6), 0.0);
        for c in [0.5, 0.7, 0.9, 0.4] {
            mem.push(record(c));
        }
        assert!((mem.average().unwrap() - 0.625).abs() < 1e-9);
        assert_eq!(mem.failures_below(0.6), 2);
        assert_eq!(mem.approved_rate(0.6), 0.5);
    }
}
