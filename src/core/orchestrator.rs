//! 编排器：单次决策运行的状态机
//!
//! 广度决策 → 生成候选 → （多条时）A/B 比较 → 评分闸门 → 写入记忆 → 终态 APPROVED / BLOCKED。
//! 生成失败在任何记忆写入之前中止本次运行；拦截结果作为 Verdict 返回而非错误。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineSection;
use crate::core::policy::{BreadthDecision, BreadthPolicy};
use crate::core::EngineError;
use crate::generator::CandidateSource;
use crate::insight::Insight;
use crate::memory::{ExecutionRecord, MemoryAgent, MemorySnapshot};
use crate::scoring::{ComparisonOutcome, Comparator, Score, Scorer};
use crate::strategy::{Strategy, StrategyStatus};

/// 拦截原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    /// 比较结果为 TIE 且历史已足够，不接受基线
    AbInconclusive,
    /// 没有任何候选达到最低接受分
    AbNoWinner,
    /// 采用的候选评分低于接受阈值
    LowConfidenceScore,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::AbInconclusive => write!(f, "AB_INCONCLUSIVE"),
            BlockReason::AbNoWinner => write!(f, "AB_NO_WINNER"),
            BlockReason::LowConfidenceScore => write!(f, "LOW_CONFIDENCE_SCORE"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Approval {
    pub run_id: Uuid,
    pub breadth: BreadthDecision,
    /// 已附带评分与 APPROVED 状态
    pub strategy: Strategy,
    pub score: Score,
    pub comparison: Option<ComparisonOutcome>,
    /// 写入本次执行后的记忆快照
    pub memory_context: MemorySnapshot,
    pub degraded_candidates: usize,
}

/// 拦截结果：附带足够的结构化上下文用于离线审计
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Blocked {
    pub run_id: Uuid,
    pub reason: BlockReason,
    pub breadth: BreadthDecision,
    pub strategy: Option<Strategy>,
    pub score: Option<Score>,
    pub comparison: Option<ComparisonOutcome>,
    pub degraded_candidates: usize,
}

/// 单次运行的终态
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approved(Approval),
    Blocked(Blocked),
}

impl Verdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved(_))
    }

    pub fn block_reason(&self) -> Option<BlockReason> {
        match self {
            Verdict::Blocked(b) => Some(b.reason),
            Verdict::Approved(_) => None,
        }
    }

    pub fn comparison(&self) -> Option<&ComparisonOutcome> {
        match self {
            Verdict::Approved(a) => a.comparison.as_ref(),
            Verdict::Blocked(b) => b.comparison.as_ref(),
        }
    }
}

pub struct Orchestrator {
    platform: String,
    objective: String,
    memory: Arc<MemoryAgent>,
    source: CandidateSource,
    scorer: Scorer,
    comparator: Comparator,
    policy: BreadthPolicy,
    acceptance_threshold: f64,
    tie_baseline_executions: u64,
}

impl Orchestrator {
    /// 使用默认阈值
    pub fn new(
        platform: impl Into<String>,
        objective: impl Into<String>,
        memory: Arc<MemoryAgent>,
        source: CandidateSource,
    ) -> Self {
        let cfg = EngineSection {
            platform: platform.into(),
            objective: objective.into(),
            ..EngineSection::default()
        };
        Self::from_config(&cfg, memory, source)
    }

    pub fn from_config(cfg: &EngineSection, memory: Arc<MemoryAgent>, source: CandidateSource) -> Self {
        let scorer = Scorer::new();
        Self {
            platform: cfg.platform.clone(),
            objective: cfg.objective.clone(),
            memory,
            source,
            scorer,
            comparator: Comparator::new(scorer)
                .with_thresholds(cfg.acceptance_threshold, cfg.min_margin),
            policy: BreadthPolicy::from_config(cfg),
            acceptance_threshold: cfg.acceptance_threshold,
            tie_baseline_executions: cfg.tie_baseline_executions,
        }
    }

    pub fn memory(&self) -> &Arc<MemoryAgent> {
        &self.memory
    }

    /// 根据当前记忆快照决定探索广度
    pub fn decide_variation_count(&self) -> Result<BreadthDecision, EngineError> {
        Ok(self.policy.decide(&self.memory.context()?))
    }

    /// 记忆读写会触及磁盘 / SQLite，放到阻塞线程池执行
    async fn with_memory<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryAgent) -> Result<T, EngineError> + Send + 'static,
    {
        let memory = Arc::clone(&self.memory);
        tokio::task::spawn_blocking(move || f(memory.as_ref()))
            .await
            .map_err(|e| EngineError::Memory(format!("memory task failed: {}", e)))?
    }

    async fn remember(&self, record: ExecutionRecord) -> Result<(), EngineError> {
        self.with_memory(move |memory| memory.record(record)).await
    }

    pub async fn run(&self, insight: &Insight) -> Result<Verdict, EngineError> {
        let run_id = Uuid::new_v4();
        let snapshot = self.with_memory(|memory| memory.context()).await?;
        let breadth = self.policy.decide(&snapshot);
        tracing::info!(
            "[{}] Generating {} variation(s) (rule {:?}, {} executions, avg {:.2})",
            run_id,
            breadth.variations,
            breadth.rule,
            snapshot.executions_count,
            snapshot.historical_confidence_avg
        );

        let outcomes = self
            .source
            .request_many(breadth.variations, insight, &self.platform, &self.objective)
            .await;
        let degraded_candidates = outcomes.iter().filter(|o| o.is_degraded()).count();
        let mut candidates = outcomes
            .into_iter()
            .map(|o| o.into_candidate())
            .collect::<Result<Vec<Strategy>, EngineError>>()?;

        let blocked = |reason: BlockReason,
                       strategy: Option<Strategy>,
                       score: Option<Score>,
                       comparison: Option<ComparisonOutcome>| {
            tracing::warn!("[{}] Pipeline blocked: {}", run_id, reason);
            Verdict::Blocked(Blocked {
                run_id,
                reason,
                breadth,
                strategy,
                score,
                comparison,
                degraded_candidates,
            })
        };

        let (chosen, comparison) = if candidates.len() > 1 {
            let outcome = self.comparator.compare(&candidates)?;
            tracing::info!("[{}] A/B result: {}", run_id, outcome.status());
            for c in outcome.ranked() {
                tracing::debug!(
                    "[{}] candidate #{} confidence {:.2} risk {} flags {:?}",
                    run_id,
                    c.index,
                    c.score.confidence,
                    c.score.risk_tier,
                    c.score.flags
                );
            }

            let adopted = match &outcome {
                ComparisonOutcome::Winner { .. } | ComparisonOutcome::WinnerByTiebreak { .. } => {
                    outcome.winner().map(|w| w.strategy.clone())
                }
                ComparisonOutcome::Tie { .. }
                    if snapshot.executions_count < self.tie_baseline_executions =>
                {
                    tracing::warn!("[{}] TIE during cold start, accepting baseline", run_id);
                    outcome.top().map(|top| top.strategy.clone())
                }
                _ => None,
            };

            match adopted {
                Some(strategy) => (strategy, Some(outcome)),
                None => {
                    let reason = match &outcome {
                        ComparisonOutcome::Tie { .. } => BlockReason::AbInconclusive,
                        ComparisonOutcome::NoWinner { .. } => BlockReason::AbNoWinner,
                        _ => {
                            return Err(EngineError::InvalidInput(
                                "comparison winner not found among ranked candidates".into(),
                            ))
                        }
                    };
                    return Ok(blocked(reason, None, None, Some(outcome)));
                }
            }
        } else {
            match candidates.pop() {
                Some(only) => (only, None),
                None => {
                    return Err(EngineError::InvalidInput(
                        "no candidate was generated".into(),
                    ))
                }
            }
        };

        let score = self.scorer.evaluate(&chosen);
        tracing::info!(
            "[{}] Score {:.2} ({}) flags {:?}",
            run_id,
            score.confidence,
            score.risk_tier,
            score.flags
        );

        if score.confidence < self.acceptance_threshold {
            self.remember(ExecutionRecord::new(
                chosen.clone(),
                score.clone(),
                comparison.clone(),
            ))
            .await?;
            return Ok(blocked(
                BlockReason::LowConfidenceScore,
                Some(chosen),
                Some(score),
                comparison,
            ));
        }

        self.remember(ExecutionRecord::new(
            chosen.clone(),
            score.clone(),
            comparison.clone(),
        ))
        .await?;
        let memory_context = self.with_memory(|memory| memory.context()).await?;

        let mut strategy = chosen;
        strategy.score = Some(score.clone());
        strategy.status = Some(StrategyStatus::ApprovedByOrchestrator);
        tracing::info!("[{}] Strategy approved", run_id);

        Ok(Verdict::Approved(Approval {
            run_id,
            breadth,
            strategy,
            score,
            comparison,
            memory_context,
            degraded_candidates,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{MockGenerator, StrategyGenerator};
    use crate::insight::{demo_records, find_winning_segment};
    use crate::memory::{GlobalStats, InMemoryLongTermStore, LongTermStats, MemoryPolicy};
    use crate::strategy::{BehaviorMetrics, Demographics};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 按顺序返回预设候选
    struct ScriptedGenerator {
        queue: Mutex<VecDeque<Strategy>>,
    }

    impl ScriptedGenerator {
        fn new(strategies: Vec<Strategy>) -> Self {
            Self {
                queue: Mutex::new(strategies.into()),
            }
        }
    }

    #[async_trait]
    impl StrategyGenerator for ScriptedGenerator {
        async fn generate(&self, _: &Insight, _: &str, _: &str) -> Result<Strategy, EngineError> {
            self.queue
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| EngineError::Generation("script exhausted".to_string()))
        }
    }

    /// 缺 ICP、ROAS 过高、点击不足：0.55
    fn weak_strategy() -> Strategy {
        Strategy {
            platform: Some("meta_ads".into()),
            behavior: BehaviorMetrics {
                expected_roas: Some(20.0),
                conversion_rate: Some(2.0),
                click_volume: Some(50),
            },
            ..Default::default()
        }
    }

    fn solid_strategy() -> Strategy {
        Strategy {
            platform: Some("meta_ads".into()),
            demographics: Demographics {
                age_range: Some("35-44".into()),
                gender: Some("M".into()),
                location: Some("Lisboa".into()),
            },
            behavior: BehaviorMetrics {
                expected_roas: Some(6.0),
                conversion_rate: Some(3.0),
                click_volume: Some(400),
            },
            creative_type: Some("carousel".into()),
            ..Default::default()
        }
    }

    fn seeded_memory(executions: u64, avg: f64) -> Arc<MemoryAgent> {
        let stats = LongTermStats {
            global_stats: GlobalStats {
                total_executions: executions,
                confidence_sum: avg * executions as f64,
            },
            ..Default::default()
        };
        let store = Arc::new(InMemoryLongTermStore::with_stats(stats));
        Arc::new(MemoryAgent::open(store, 10, MemoryPolicy::default()).unwrap())
    }

    fn orchestrator(generator: Arc<dyn StrategyGenerator>, memory: Arc<MemoryAgent>) -> Orchestrator {
        let source = CandidateSource::new(generator, Duration::from_secs(1))
            .with_fallback(false)
            .with_concurrency(false);
        Orchestrator::new("meta_ads", "leads", memory, source)
    }

    fn insight() -> Insight {
        find_winning_segment(&demo_records()).unwrap()
    }

    #[tokio::test]
    async fn test_cold_start_tie_accepts_baseline() {
        let memory = Arc::new(MemoryAgent::in_memory());
        let orch = orchestrator(Arc::new(MockGenerator::new()), memory.clone());

        let verdict = orch.run(&insight()).await.unwrap();
        let Verdict::Approved(approval) = verdict else {
            panic!("expected approval");
        };
        assert_eq!(approval.breadth.variations, 2);
        assert!(matches!(approval.comparison, Some(ComparisonOutcome::Tie { .. })));
        assert_eq!(approval.score.confidence, 1.0);
        assert_eq!(
            approval.strategy.status,
            Some(StrategyStatus::ApprovedByOrchestrator)
        );
        assert_eq!(approval.strategy.score.as_ref(), Some(&approval.score));
        assert_eq!(approval.memory_context.executions_count, 1);
        assert_eq!(memory.context().unwrap().executions_count, 1);
    }

    #[tokio::test]
    async fn test_clear_winner_is_adopted() {
        let generator = ScriptedGenerator::new(vec![weak_strategy(), solid_strategy()]);
        let orch = orchestrator(Arc::new(generator), Arc::new(MemoryAgent::in_memory()));

        let verdict = orch.run(&insight()).await.unwrap();
        assert!(verdict.is_approved());
        let Some(ComparisonOutcome::Winner { winner_index, .. }) = verdict.comparison() else {
            panic!("expected WINNER");
        };
        assert_eq!(*winner_index, 1);
    }

    #[tokio::test]
    async fn test_no_winner_blocks_without_memory_write() {
        let generator = ScriptedGenerator::new(vec![weak_strategy(), weak_strategy()]);
        let memory = Arc::new(MemoryAgent::in_memory());
        let orch = orchestrator(Arc::new(generator), memory.clone());

        let verdict = orch.run(&insight()).await.unwrap();
        assert_eq!(verdict.block_reason(), Some(BlockReason::AbNoWinner));
        assert!(memory.recent_records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tie_after_baseline_is_inconclusive() {
        let generator = ScriptedGenerator::new(vec![solid_strategy(), solid_strategy()]);
        let orch = orchestrator(Arc::new(generator), seeded_memory(6, 0.75));

        let verdict = orch.run(&insight()).await.unwrap();
        assert_eq!(verdict.block_reason(), Some(BlockReason::AbInconclusive));
    }

    #[tokio::test]
    async fn test_low_confidence_is_blocked_but_remembered() {
        let generator = ScriptedGenerator::new(vec![weak_strategy()]);
        let memory = seeded_memory(6, 0.9);
        let orch = orchestrator(Arc::new(generator), memory.clone());
        assert_eq!(orch.decide_variation_count().unwrap().variations, 1);

        let verdict = orch.run(&insight()).await.unwrap();
        let Verdict::Blocked(blocked) = verdict else {
            panic!("expected block");
        };
        assert_eq!(blocked.reason, BlockReason::LowConfidenceScore);
        assert_eq!(blocked.score.map(|s| s.confidence), Some(0.55));
        assert!(blocked.comparison.is_none());

        let ctx = memory.context().unwrap();
        assert_eq!(ctx.executions_count, 6);
        assert_eq!(ctx.recent_confidences, vec![0.55]);
    }

    #[tokio::test]
    async fn test_generation_failure_aborts_before_memory_write() {
        let generator = ScriptedGenerator::new(vec![solid_strategy()]);
        let memory = Arc::new(MemoryAgent::in_memory());
        let orch = orchestrator(Arc::new(generator), memory.clone());

        let err = orch.run(&insight()).await.unwrap_err();
        assert!(err.is_generation_failure());
        assert!(memory.recent_records().unwrap().is_empty());
        assert_eq!(memory.context().unwrap().executions_count, 0);
    }

    /// record_success 通知开始后等待异步侧确认；若在运行时线程上阻塞执行，确认永远到不了
    struct HandshakeStore {
        inner: InMemoryLongTermStore,
        started: tokio::sync::mpsc::UnboundedSender<()>,
        ack: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl crate::memory::LongTermStore for HandshakeStore {
        fn load(&self) -> Result<LongTermStats, EngineError> {
            self.inner.load()
        }

        fn record_success(
            &self,
            sample: &crate::memory::SuccessSample,
        ) -> Result<LongTermStats, EngineError> {
            let _ = self.started.send(());
            self.ack
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(2))
                .map_err(|_| EngineError::Memory("write blocked the runtime".to_string()))?;
            self.inner.record_success(sample)
        }

        fn location(&self) -> String {
            "handshake".to_string()
        }
    }

    #[tokio::test]
    async fn test_memory_write_runs_off_the_runtime_thread() {
        let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = std::sync::mpsc::channel();
        let store = Arc::new(HandshakeStore {
            inner: InMemoryLongTermStore::new(),
            started: started_tx,
            ack: Mutex::new(ack_rx),
        });
        let memory = Arc::new(MemoryAgent::open(store, 10, MemoryPolicy::default()).unwrap());
        let orch = orchestrator(Arc::new(MockGenerator::new()), memory.clone());

        tokio::spawn(async move {
            while started_rx.recv().await.is_some() {
                let _ = ack_tx.send(());
            }
        });

        let verdict = orch.run(&insight()).await.unwrap();
        assert!(verdict.is_approved());
        assert_eq!(memory.context().unwrap().executions_count, 1);
    }
}
