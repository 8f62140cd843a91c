//! 生成器边界：把洞察变成候选策略
//!
//! 外部生成器（LLM 或 Mock）实现 StrategyGenerator；CandidateSource 负责超时与降级，
//! 把每次调用的结果显式区分为 Generated / Degraded / Failed，由编排器决定如何处理。

pub mod mock;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::core::EngineError;
use crate::insight::Insight;
use crate::strategy::{Demographics, Strategy};

pub use mock::MockGenerator;
pub use openai::OpenAiGenerator;

pub const FALLBACK_MESSAGE: &str = "Olá! Vi o teu perfil e achei interessante. (Fallback)";

/// 外部生成器：每次调用相互独立，引擎不假设其内部状态
#[async_trait]
pub trait StrategyGenerator: Send + Sync {
    async fn generate(
        &self,
        insight: &Insight,
        platform: &str,
        objective: &str,
    ) -> Result<Strategy, EngineError>;

    fn name(&self) -> &str {
        "generator"
    }
}

/// 单次生成的结果
#[derive(Debug)]
pub enum GenerationOutcome {
    Generated(Strategy),
    /// 生成失败后使用的降级候选（结构完整，质量较低）
    Degraded { strategy: Strategy, cause: String },
    Failed(EngineError),
}

impl GenerationOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, GenerationOutcome::Degraded { .. })
    }

    /// Generated / Degraded 都可作为候选；Failed 变为错误
    pub fn into_candidate(self) -> Result<Strategy, EngineError> {
        match self {
            GenerationOutcome::Generated(strategy) => Ok(strategy),
            GenerationOutcome::Degraded { strategy, cause } => {
                tracing::warn!("Using fallback strategy: {}", cause);
                Ok(strategy)
            }
            GenerationOutcome::Failed(e) => Err(e),
        }
    }
}

/// 由洞察构造的降级候选
pub fn fallback_strategy(insight: &Insight, platform: &str, objective: &str) -> Strategy {
    let demo = &insight.top_demographics;
    Strategy {
        platform: Some(platform.to_string()),
        objective: Some(objective.to_string()),
        target_audience: Some(format!(
            "Público {} {} (Fallback)",
            demo.gender, demo.age_range
        )),
        demographics: Demographics {
            age_range: Some(demo.age_range.clone()),
            gender: Some(demo.gender.clone()),
            location: None,
        },
        message_template: Some(FALLBACK_MESSAGE.to_string()),
        keywords: vec!["fallback".into(), "erro".into(), "teste".into()],
        ..Default::default()
    }
}

/// 带超时与降级策略的候选来源
#[derive(Clone)]
pub struct CandidateSource {
    generator: Arc<dyn StrategyGenerator>,
    timeout: Duration,
    fallback_on_error: bool,
    concurrent: bool,
}

impl CandidateSource {
    pub fn new(generator: Arc<dyn StrategyGenerator>, timeout: Duration) -> Self {
        Self {
            generator,
            timeout,
            fallback_on_error: true,
            concurrent: true,
        }
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_on_error = enabled;
        self
    }

    pub fn with_concurrency(mut self, enabled: bool) -> Self {
        self.concurrent = enabled;
        self
    }

    /// 请求一条候选；超时与失败同样处理
    pub async fn request(
        &self,
        insight: &Insight,
        platform: &str,
        objective: &str,
    ) -> GenerationOutcome {
        if !insight.has_demographics() {
            return GenerationOutcome::Failed(EngineError::Generation(
                "insight has no demographics to build a strategy from".to_string(),
            ));
        }

        let result = tokio::time::timeout(
            self.timeout,
            self.generator.generate(insight, platform, objective),
        )
        .await
        .unwrap_or_else(|_| Err(EngineError::GenerationTimeout(self.timeout.as_secs())));

        match result {
            Ok(strategy) => GenerationOutcome::Generated(strategy),
            Err(e) if self.fallback_on_error => {
                tracing::warn!("{} failed ({}), falling back", self.generator.name(), e);
                GenerationOutcome::Degraded {
                    strategy: fallback_strategy(insight, platform, objective),
                    cause: e.to_string(),
                }
            }
            Err(e) => GenerationOutcome::Failed(e),
        }
    }

    /// 请求 n 条候选，结果顺序与请求顺序一致
    pub async fn request_many(
        &self,
        n: usize,
        insight: &Insight,
        platform: &str,
        objective: &str,
    ) -> Vec<GenerationOutcome> {
        if self.concurrent {
            join_all((0..n).map(|_| self.request(insight, platform, objective))).await
        } else {
            let mut outcomes = Vec::with_capacity(n);
            for _ in 0..n {
                outcomes.push(self.request(insight, platform, objective).await);
            }
            outcomes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::SegmentDemographics;

    struct FailingGenerator;

    #[async_trait]
    impl StrategyGenerator for FailingGenerator {
        async fn generate(&self, _: &Insight, _: &str, _: &str) -> Result<Strategy, EngineError> {
            Err(EngineError::Generation("upstream 503".to_string()))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl StrategyGenerator for SlowGenerator {
        async fn generate(&self, _: &Insight, _: &str, _: &str) -> Result<Strategy, EngineError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Strategy::default())
        }
    }

    fn insight() -> Insight {
        Insight {
            top_demographics: SegmentDemographics {
                age_range: "35-44".into(),
                gender: "M".into(),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_failure_degrades_to_fallback() {
        let source = CandidateSource::new(Arc::new(FailingGenerator), Duration::from_secs(1));
        let outcome = source.request(&insight(), "meta_ads", "leads").await;
        assert!(outcome.is_degraded());
        let strategy = outcome.into_candidate().unwrap();
        assert_eq!(
            strategy.target_audience.as_deref(),
            Some("Público M 35-44 (Fallback)")
        );
        assert_eq!(strategy.platform.as_deref(), Some("meta_ads"));
        assert_eq!(strategy.keywords, vec!["fallback", "erro", "teste"]);
    }

    #[tokio::test]
    async fn test_failure_without_fallback_is_an_error() {
        let source = CandidateSource::new(Arc::new(FailingGenerator), Duration::from_secs(1))
            .with_fallback(false);
        let outcome = source.request(&insight(), "meta_ads", "leads").await;
        assert!(matches!(
            outcome,
            GenerationOutcome::Failed(EngineError::Generation(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_treated_as_failure() {
        let source = CandidateSource::new(Arc::new(SlowGenerator), Duration::from_millis(20))
            .with_fallback(false);
        let outcome = source.request(&insight(), "meta_ads", "leads").await;
        assert!(matches!(
            outcome,
            GenerationOutcome::Failed(EngineError::GenerationTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_demographics_always_fails() {
        let source = CandidateSource::new(Arc::new(MockGenerator::new()), Duration::from_secs(1));
        let outcome = source.request(&Insight::default(), "meta_ads", "leads").await;
        assert!(matches!(outcome, GenerationOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_request_many_returns_n_outcomes() {
        let source = CandidateSource::new(Arc::new(MockGenerator::new()), Duration::from_secs(1));
        let outcomes = source.request_many(3, &insight(), "google_ads", "sales").await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, GenerationOutcome::Generated(_))));
    }
}
