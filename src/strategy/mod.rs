//! 候选策略：由外部生成器产出的结构化记录
//!
//! 引擎只读取其中的命名字段（平台、目标、受众画像、行为指标、话术模板、创意类型、投放位置）；
//! 缺失字段一律视为「不存在 / 0」，从不作为错误处理。

use serde::{Deserialize, Serialize};

use crate::scoring::Score;

/// 受众人口画像（ICP demographics）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Demographics {
    /// 三项（年龄段、性别、地区）均为非空字符串
    pub fn is_complete(&self) -> bool {
        [&self.age_range, &self.gender, &self.location]
            .iter()
            .all(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    pub fn is_empty(&self) -> bool {
        self.age_range.is_none() && self.gender.is_none() && self.location.is_none()
    }
}

/// 行为指标：期望 ROAS、转化率（百分比）、点击量
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_roas: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_volume: Option<u64>,
}

impl BehaviorMetrics {
    pub fn is_empty(&self) -> bool {
        self.expected_roas.is_none() && self.conversion_rate.is_none() && self.click_volume.is_none()
    }
}

/// 策略在决策流程中的状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyStatus {
    ApprovedByOrchestrator,
}

/// 一条候选策略（投放计划）
///
/// `status` 与 `score` 只在编排器批准后写入，其余字段来自生成器。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    /// 人类可读的受众描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Demographics::is_empty")]
    pub demographics: Demographics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    #[serde(default, skip_serializing_if = "BehaviorMetrics::is_empty")]
    pub behavior: BehaviorMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StrategyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
}

impl Strategy {
    /// 已填充的内容字段数（不含 status / score），用于平局裁决「越简单越优先」
    pub fn populated_field_count(&self) -> usize {
        let optional = [
            &self.platform,
            &self.objective,
            &self.target_audience,
            &self.message_template,
            &self.creative_type,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count();
        let nested = [!self.demographics.is_empty(), !self.behavior.is_empty()]
            .iter()
            .filter(|b| **b)
            .count();
        let lists = [&self.interests, &self.placements, &self.keywords]
            .iter()
            .filter(|l| !l.is_empty())
            .count();
        optional + nested + lists
    }

    pub fn platform_or_unknown(&self) -> &str {
        self.platform.as_deref().unwrap_or("unknown")
    }

    pub fn creative_or_unknown(&self) -> &str {
        self.creative_type.as_deref().unwrap_or("unknown")
    }
}
