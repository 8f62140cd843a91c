//! 评分器：对单条候选策略做确定性规则检查
//!
//! 从 1.0 开始，每条规则独立扣分并追加一个标记；所有规则无条件执行，互不影响。
//! 扣分以「百分点」整数累加，保证顺序无关；最终置信度 clamp 到 [0, 1] 并保留两位小数。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::strategy::Strategy;

/// 低风险下限
pub const LOW_RISK_MIN: f64 = 0.8;
/// 中风险下限
pub const MEDIUM_RISK_MIN: f64 = 0.6;

pub const ROAS_CEILING: f64 = 15.0;
pub const CONVERSION_CEILING: f64 = 25.0;
pub const MIN_CLICK_VOLUME: u64 = 100;

/// 被视为空洞话术的短语（小写匹配）
pub const GENERIC_PHRASES: [&str; 4] = [
    "aproveite agora",
    "não perca",
    "o melhor para você",
    "solução ideal",
];

/// 风险等级：置信度的纯函数
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= LOW_RISK_MIN {
            RiskTier::Low
        } else if confidence >= MEDIUM_RISK_MIN {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    /// 越小越安全；平局裁决时使用
    pub fn rank(self) -> u8 {
        match self {
            RiskTier::Low => 0,
            RiskTier::Medium => 1,
            RiskTier::High => 2,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// 违规标记（序列化为历史数据中使用的标签名）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreFlag {
    #[serde(rename = "icp_incompleto")]
    IncompleteIcp,
    #[serde(rename = "roas_irrealista")]
    UnrealisticRoas,
    #[serde(rename = "conversao_irrealista")]
    UnrealisticConversion,
    #[serde(rename = "baixo_volume_cliques")]
    LowClickVolume,
    #[serde(rename = "mensagem_generica")]
    GenericMessage,
    #[serde(rename = "criativo_incompativel_plataforma")]
    CreativePlatformMismatch,
}

impl ScoreFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreFlag::IncompleteIcp => "icp_incompleto",
            ScoreFlag::UnrealisticRoas => "roas_irrealista",
            ScoreFlag::UnrealisticConversion => "conversao_irrealista",
            ScoreFlag::LowClickVolume => "baixo_volume_cliques",
            ScoreFlag::GenericMessage => "mensagem_generica",
            ScoreFlag::CreativePlatformMismatch => "criativo_incompativel_plataforma",
        }
    }
}

impl fmt::Display for ScoreFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 评分结果；一经产生不再修改
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub confidence: f64,
    pub risk_tier: RiskTier,
    pub flags: Vec<ScoreFlag>,
    pub evaluated_at: DateTime<Utc>,
}

impl Score {
    /// 由置信度推导风险等级；置信度先 clamp 到 [0, 1] 并保留两位小数
    pub fn new(confidence: f64, flags: Vec<ScoreFlag>, evaluated_at: DateTime<Utc>) -> Self {
        let confidence = round_cents(confidence.clamp(0.0, 1.0));
        Self {
            confidence,
            risk_tier: RiskTier::from_confidence(confidence),
            flags,
            evaluated_at,
        }
    }

    pub fn flag_count(&self) -> usize {
        self.flags.len()
    }

    pub fn has_flag(&self, flag: ScoreFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// 保留两位小数
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

type Check = fn(&Strategy) -> bool;

/// (标记, 扣分百分点, 触发条件)
const RULES: [(ScoreFlag, u32, Check); 7] = [
    (ScoreFlag::IncompleteIcp, 20, |s: &Strategy| !s.demographics.is_complete()),
    (ScoreFlag::UnrealisticRoas, 15, |s: &Strategy| {
        s.behavior.expected_roas.unwrap_or(0.0) > ROAS_CEILING
    }),
    (ScoreFlag::UnrealisticConversion, 15, |s: &Strategy| {
        s.behavior.conversion_rate.unwrap_or(0.0) > CONVERSION_CEILING
    }),
    (ScoreFlag::LowClickVolume, 10, |s: &Strategy| {
        s.behavior.click_volume.unwrap_or(0) < MIN_CLICK_VOLUME
    }),
    (ScoreFlag::GenericMessage, 10, has_generic_message),
    (ScoreFlag::CreativePlatformMismatch, 10, |s: &Strategy| {
        creative_mismatch(s, "google_ads", "video")
    }),
    (ScoreFlag::CreativePlatformMismatch, 10, |s: &Strategy| {
        creative_mismatch(s, "meta_ads", "search")
    }),
];

fn has_generic_message(strategy: &Strategy) -> bool {
    let message = strategy
        .message_template
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    GENERIC_PHRASES.iter().any(|p| message.contains(p))
}

fn creative_mismatch(strategy: &Strategy, platform: &str, creative_keyword: &str) -> bool {
    strategy.platform.as_deref() == Some(platform)
        && strategy
            .creative_type
            .as_deref()
            .unwrap_or_default()
            .to_lowercase()
            .contains(creative_keyword)
}

/// 确定性评分器：无状态、无副作用、无失败路径
#[derive(Debug, Default, Clone, Copy)]
pub struct Scorer;

impl Scorer {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, strategy: &Strategy) -> Score {
        self.evaluate_at(strategy, Utc::now())
    }

    /// 指定评估时间；相同输入 + 相同时间得到完全相同的 Score
    pub fn evaluate_at(&self, strategy: &Strategy, evaluated_at: DateTime<Utc>) -> Score {
        let mut penalty = 0u32;
        let mut flags = Vec::new();
        for (flag, points, check) in RULES.iter() {
            if check(strategy) {
                penalty += points;
                flags.push(*flag);
            }
        }
        let confidence = 100u32.saturating_sub(penalty) as f64 / 100.0;
        Score::new(confidence, flags, evaluated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{BehaviorMetrics, Demographics};

    fn clean_strategy() -> Strategy {
        Strategy {
            platform: Some("meta_ads".into()),
            objective: Some("leads".into()),
            demographics: Demographics {
                age_range: Some("25-34".into()),
                gender: Some("F".into()),
                location: Some("Porto".into()),
            },
            behavior: BehaviorMetrics {
                expected_roas: Some(4.2),
                conversion_rate: Some(3.5),
                click_volume: Some(1200),
            },
            message_template: Some("Olá {name}, temos um treino feito à sua medida.".into()),
            creative_type: Some("carousel".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_strategy_scores_full() {
        let score = Scorer::new().evaluate(&clean_strategy());
        assert_eq!(score.confidence, 1.0);
        assert_eq!(score.risk_tier, RiskTier::Low);
        assert!(score.flags.is_empty());
    }

    #[test]
    fn test_empty_strategy_treats_missing_as_absent() {
        let score = Scorer::new().evaluate(&Strategy::default());
        // ICP 不完整 + 点击量为 0
        assert_eq!(score.confidence, 0.7);
        assert_eq!(score.risk_tier, RiskTier::Medium);
        assert_eq!(
            score.flags,
            vec![ScoreFlag::IncompleteIcp, ScoreFlag::LowClickVolume]
        );
    }

    #[test]
    fn test_stacked_penalties_accumulate() {
        let s = Strategy {
            platform: Some("google_ads".into()),
            behavior: BehaviorMetrics {
                expected_roas: Some(30.0),
                conversion_rate: Some(40.0),
                click_volume: Some(5),
            },
            message_template: Some("Não PERCA esta oferta".into()),
            creative_type: Some("Short Video".into()),
            ..Default::default()
        };
        let score = Scorer::new().evaluate(&s);
        assert_eq!(score.confidence, 0.2);
        assert_eq!(score.risk_tier, RiskTier::High);
        assert!(score.has_flag(ScoreFlag::GenericMessage));
        assert!(score.has_flag(ScoreFlag::CreativePlatformMismatch));
        assert_eq!(score.flag_count(), 6);
    }

    #[test]
    fn test_meta_search_creative_mismatch() {
        let mut s = clean_strategy();
        s.creative_type = Some("Search ad".into());
        let score = Scorer::new().evaluate(&s);
        assert_eq!(score.confidence, 0.9);
        assert_eq!(score.flags, vec![ScoreFlag::CreativePlatformMismatch]);
    }

    #[test]
    fn test_threshold_boundaries_are_strict() {
        let mut s = clean_strategy();
        s.behavior.expected_roas = Some(15.0);
        s.behavior.conversion_rate = Some(25.0);
        s.behavior.click_volume = Some(100);
        assert_eq!(Scorer::new().evaluate(&s).confidence, 1.0);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let at = Utc::now();
        let s = clean_strategy();
        let a = Scorer::new().evaluate_at(&s, at);
        let b = Scorer::new().evaluate_at(&s, at);
        assert_eq!(a, b);
    }

    #[test]
    fn test_risk_tier_thresholds() {
        assert_eq!(RiskTier::from_confidence(0.8), RiskTier::Low);
        assert_eq!(RiskTier::from_confidence(0.79), RiskTier::Medium);
        assert_eq!(RiskTier::from_confidence(0.6), RiskTier::Medium);
        assert_eq!(RiskTier::from_confidence(0.59), RiskTier::High);
        assert_eq!(Score::new(1.7, vec![], Utc::now()).confidence, 1.0);
        assert_eq!(Score::new(-0.3, vec![], Utc::now()).confidence, 0.0);
    }

    #[test]
    fn test_flags_serialize_with_legacy_tags() {
        let json = serde_json::to_string(&ScoreFlag::LowClickVolume).unwrap();
        assert_eq!(json, "\"baixo_volume_cliques\"");
    }
}
