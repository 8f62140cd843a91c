//! 流水线：编排器 + 批准后的尽力持久化
//!
//! 持久化失败只记录告警，不会撤销已经给出的裁决。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::orchestrator::{Orchestrator, Verdict};
use crate::core::EngineError;
use crate::insight::Insight;
use crate::persistence::{SavedStrategy, StrategyRepository};

/// 批准后的持久化结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PersistenceReport {
    Saved(SavedStrategy),
    Failed { error: String },
    /// 被拦截，或未配置仓库
    Skipped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineReport {
    pub verdict: Verdict,
    pub persistence: PersistenceReport,
}

/// 活动名称：Otimização_YYYY-MM-DD_HH-MM（本地时间）
pub fn campaign_name() -> String {
    chrono::Local::now()
        .format("Otimização_%Y-%m-%d_%H-%M")
        .to_string()
}

pub struct Pipeline {
    orchestrator: Orchestrator,
    repository: Option<Arc<dyn StrategyRepository>>,
}

impl Pipeline {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            repository: None,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn StrategyRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn run(&self, insight: &Insight) -> Result<PipelineReport, EngineError> {
        let verdict = self.orchestrator.run(insight).await?;

        let persistence = match (&verdict, &self.repository) {
            (Verdict::Approved(approval), Some(repository)) => {
                let repository = Arc::clone(repository);
                let strategy = approval.strategy.clone();
                let name = campaign_name();
                let saved = tokio::task::spawn_blocking(move || repository.save(&strategy, &name))
                    .await
                    .map_err(|e| EngineError::Persistence(e.to_string()))
                    .and_then(|r| r);
                match saved {
                    Ok(saved) => {
                        tracing::info!("Strategy saved with id {} ({})", saved.id, saved.status);
                        PersistenceReport::Saved(saved)
                    }
                    Err(e) => {
                        tracing::warn!("Approved strategy could not be persisted: {}", e);
                        PersistenceReport::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            }
            _ => PersistenceReport::Skipped,
        };

        Ok(PipelineReport {
            verdict,
            persistence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{CandidateSource, MockGenerator};
    use crate::insight::{demo_records, find_winning_segment};
    use crate::memory::MemoryAgent;
    use crate::persistence::{SimulatedFeedback, SqliteStrategyRepository, StoredStrategy};
    use crate::strategy::Strategy;
    use std::time::Duration;

    struct BrokenRepository;

    impl StrategyRepository for BrokenRepository {
        fn save(&self, _: &Strategy, _: &str) -> Result<SavedStrategy, EngineError> {
            Err(EngineError::Persistence("disk full".to_string()))
        }

        fn get(&self, _: i64) -> Result<Option<StoredStrategy>, EngineError> {
            Ok(None)
        }

        fn record_feedback(&self, _: i64, _: &SimulatedFeedback) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn orchestrator() -> Orchestrator {
        let source = CandidateSource::new(Arc::new(MockGenerator::new()), Duration::from_secs(1));
        Orchestrator::new("meta_ads", "leads", Arc::new(MemoryAgent::in_memory()), source)
    }

    #[test]
    fn test_campaign_name_format() {
        let name = campaign_name();
        assert!(name.starts_with("Otimização_"));
        assert_eq!(name.len(), "Otimização_2024-01-01_10-00".len());
    }

    #[tokio::test]
    async fn test_approved_strategy_is_saved() {
        let repo = Arc::new(SqliteStrategyRepository::open_in_memory().unwrap());
        let pipeline = Pipeline::new(orchestrator()).with_repository(repo.clone());
        let insight = find_winning_segment(&demo_records()).unwrap();

        let report = pipeline.run(&insight).await.unwrap();
        assert!(report.verdict.is_approved());
        let PersistenceReport::Saved(saved) = report.persistence else {
            panic!("expected saved strategy");
        };
        let stored = repo.get(saved.id).unwrap().unwrap();
        assert_eq!(stored.status, "PENDING");
        assert!(stored.campaign_name.starts_with("Otimização_"));
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_approval() {
        let pipeline = Pipeline::new(orchestrator()).with_repository(Arc::new(BrokenRepository));
        let insight = find_winning_segment(&demo_records()).unwrap();

        let report = pipeline.run(&insight).await.unwrap();
        assert!(report.verdict.is_approved());
        assert!(matches!(report.persistence, PersistenceReport::Failed { .. }));
    }

    #[tokio::test]
    async fn test_without_repository_persistence_is_skipped() {
        let pipeline = Pipeline::new(orchestrator());
        let insight = find_winning_segment(&demo_records()).unwrap();
        let report = pipeline.run(&insight).await.unwrap();
        assert_eq!(report.persistence, PersistenceReport::Skipped);
    }
}
