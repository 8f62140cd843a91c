//! Mock 生成器（用于测试与离线运行，无需 API）
//!
//! 直接由洞察推导一条结构完整的候选：人口画像、行为指标取自细分人群的表现数据。

use async_trait::async_trait;

use crate::core::EngineError;
use crate::generator::StrategyGenerator;
use crate::insight::Insight;
use crate::strategy::{BehaviorMetrics, Demographics, Strategy};

/// 确定性 Mock：相同输入总是得到相同候选
#[derive(Debug, Clone)]
pub struct MockGenerator {
    location: String,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            location: "Brasil".to_string(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

fn creative_for(platform: &str) -> &'static str {
    match platform {
        "google_ads" => "responsive_search",
        "meta_ads" => "carousel",
        _ => "image",
    }
}

#[async_trait]
impl StrategyGenerator for MockGenerator {
    async fn generate(
        &self,
        insight: &Insight,
        platform: &str,
        objective: &str,
    ) -> Result<Strategy, EngineError> {
        let demo = &insight.top_demographics;
        let metrics = &insight.performance_metrics;
        Ok(Strategy {
            platform: Some(platform.to_string()),
            objective: Some(objective.to_string()),
            target_audience: Some(format!(
                "Público {} {} em {}",
                demo.gender, demo.age_range, self.location
            )),
            demographics: Demographics {
                age_range: Some(demo.age_range.clone()),
                gender: Some(demo.gender.clone()),
                location: Some(self.location.clone()),
            },
            interests: vec!["bem-estar".into(), "tecnologia".into()],
            behavior: BehaviorMetrics {
                expected_roas: Some(metrics.roas),
                conversion_rate: Some(3.0),
                click_volume: Some(metrics.volume_metric.saturating_mul(20)),
            },
            message_template: Some(format!(
                "Olá {{name}}, preparámos algo a pensar em quem tem {}.",
                demo.age_range
            )),
            creative_type: Some(creative_for(platform).to_string()),
            placements: vec!["feed".into()],
            keywords: vec![demo.age_range.clone(), demo.gender.clone()],
            ..Default::default()
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
