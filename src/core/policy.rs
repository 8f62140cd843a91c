//! 探索广度策略：根据记忆快照决定本次生成多少条候选
//!
//! 规则按固定顺序求值，第一条命中的规则生效：
//! 1. 冷启动（执行数不足）→ 探索
//! 2. 近期置信度波动过大 → 重新比较验证
//! 3. 长期高信任且样本充足 → 直接采用单条候选
//! 4. 中等信任 → 轻量探索
//! 5. 其余 → 加强探索

use serde::{Deserialize, Serialize};

use crate::config::EngineSection;
use crate::memory::MemorySnapshot;
use crate::scoring::round_cents;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadthRule {
    ColdStart,
    Unstable,
    HighTrust,
    ModerateTrust,
    LowTrust,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreadthDecision {
    pub rule: BreadthRule,
    pub variations: usize,
}

#[derive(Clone, Debug)]
pub struct BreadthPolicy {
    pub cold_start_executions: u64,
    pub instability_min_samples: usize,
    pub instability_spread: f64,
    pub high_trust_avg: f64,
    pub high_trust_min_executions: u64,
    pub moderate_trust_avg: f64,
    pub cold_start_variations: usize,
    pub unstable_variations: usize,
    pub high_trust_variations: usize,
    pub moderate_trust_variations: usize,
    pub low_trust_variations: usize,
}

impl Default for BreadthPolicy {
    fn default() -> Self {
        Self::from_config(&EngineSection::default())
    }
}

impl BreadthPolicy {
    pub fn from_config(cfg: &EngineSection) -> Self {
        Self {
            cold_start_executions: cfg.cold_start_executions,
            instability_min_samples: cfg.instability_min_samples,
            instability_spread: cfg.instability_spread,
            high_trust_avg: cfg.high_trust_avg,
            high_trust_min_executions: cfg.high_trust_min_executions,
            moderate_trust_avg: cfg.moderate_trust_avg,
            cold_start_variations: cfg.breadth.cold_start,
            unstable_variations: cfg.breadth.unstable,
            high_trust_variations: cfg.breadth.high_trust,
            moderate_trust_variations: cfg.breadth.moderate_trust,
            low_trust_variations: cfg.breadth.low_trust,
        }
    }

    fn is_unstable(&self, ctx: &MemorySnapshot) -> bool {
        if ctx.recent_confidences.len() < self.instability_min_samples {
            return false;
        }
        ctx.recent_spread()
            .is_some_and(|spread| round_cents(spread) > self.instability_spread)
    }

    fn rule_for(&self, ctx: &MemorySnapshot) -> BreadthRule {
        // 阈值比较按两位小数
        let avg = round_cents(ctx.historical_confidence_avg);
        if ctx.executions_count < self.cold_start_executions {
            BreadthRule::ColdStart
        } else if self.is_unstable(ctx) {
            BreadthRule::Unstable
        } else if avg >= self.high_trust_avg
            && ctx.executions_count >= self.high_trust_min_executions
        {
            BreadthRule::HighTrust
        } else if avg >= self.moderate_trust_avg {
            BreadthRule::ModerateTrust
        } else {
            BreadthRule::LowTrust
        }
    }

    pub fn decide(&self, ctx: &MemorySnapshot) -> BreadthDecision {
        let rule = self.rule_for(ctx);
        let variations = match rule {
            BreadthRule::ColdStart => self.cold_start_variations,
            BreadthRule::Unstable => self.unstable_variations,
            BreadthRule::HighTrust => self.high_trust_variations,
            BreadthRule::ModerateTrust => self.moderate_trust_variations,
            BreadthRule::LowTrust => self.low_trust_variations,
        };
        BreadthDecision {
            rule,
            variations: variations.max(1),
        }
    }
}
