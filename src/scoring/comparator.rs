//! 比较器（A/B）：对多条候选策略评分、排序并选出胜者
//!
//! 稳定排序（同分保持输入顺序）后看第一名与第二名：
//! - 第一名低于最低接受分 → NoWinner
//! - 分差小于最小间隔 → 依次按风险等级、标记数、字段数裁决；仍相同则 Tie
//! - 否则 → Winner
//!
//! 无论走哪个分支，全部 (候选, 评分) 都保留在结果中，便于离线审计。

use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::scoring::scorer::{round_cents, Score, Scorer};
use crate::strategy::Strategy;

pub const DEFAULT_MIN_ACCEPTANCE: f64 = 0.6;
pub const DEFAULT_MIN_MARGIN: f64 = 0.05;

/// 排名中的一项；`index` 为其在输入序列中的位置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub index: usize,
    pub strategy: Strategy,
    pub score: Score,
}

impl RankedCandidate {
    pub fn confidence(&self) -> f64 {
        self.score.confidence
    }
}

/// 平局裁决中起决定作用的判据
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaker {
    RiskTier,
    FlagCount,
    FieldCount,
}

/// 一次比较的结果（只在单次编排运行内存在）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonOutcome {
    Winner {
        winner_index: usize,
        winner_confidence: f64,
        runner_up_confidence: f64,
        ranked: Vec<RankedCandidate>,
    },
    WinnerByTiebreak {
        winner_index: usize,
        decided_by: TieBreaker,
        ranked: Vec<RankedCandidate>,
    },
    Tie {
        best_confidence: f64,
        runner_up_confidence: f64,
        ranked: Vec<RankedCandidate>,
    },
    NoWinner {
        reason: String,
        ranked: Vec<RankedCandidate>,
    },
}

impl ComparisonOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ComparisonOutcome::Winner { .. } => "WINNER",
            ComparisonOutcome::WinnerByTiebreak { .. } => "WINNER_BY_TIEBREAK",
            ComparisonOutcome::Tie { .. } => "TIE",
            ComparisonOutcome::NoWinner { .. } => "NO_WINNER",
        }
    }

    /// 按置信度降序排列的全部候选
    pub fn ranked(&self) -> &[RankedCandidate] {
        match self {
            ComparisonOutcome::Winner { ranked, .. }
            | ComparisonOutcome::WinnerByTiebreak { ranked, .. }
            | ComparisonOutcome::Tie { ranked, .. }
            | ComparisonOutcome::NoWinner { ranked, .. } => ranked,
        }
    }

    pub fn winner_index(&self) -> Option<usize> {
        match self {
            ComparisonOutcome::Winner { winner_index, .. }
            | ComparisonOutcome::WinnerByTiebreak { winner_index, .. } => Some(*winner_index),
            _ => None,
        }
    }

    /// 胜者（仅 Winner / WinnerByTiebreak）
    pub fn winner(&self) -> Option<&RankedCandidate> {
        let index = self.winner_index()?;
        self.ranked().iter().find(|c| c.index == index)
    }

    /// 排名第一的候选
    pub fn top(&self) -> Option<&RankedCandidate> {
        self.ranked().first()
    }
}

/// 比较器：持有评分器与两个阈值
#[derive(Debug, Clone)]
pub struct Comparator {
    scorer: Scorer,
    min_acceptance: f64,
    min_margin: f64,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(Scorer::new())
    }
}

impl Comparator {
    pub fn new(scorer: Scorer) -> Self {
        Self {
            scorer,
            min_acceptance: DEFAULT_MIN_ACCEPTANCE,
            min_margin: DEFAULT_MIN_MARGIN,
        }
    }

    pub fn with_thresholds(mut self, min_acceptance: f64, min_margin: f64) -> Self {
        self.min_acceptance = min_acceptance;
        self.min_margin = min_margin;
        self
    }

    /// 对全部候选评分后比较；少于 2 条时返回 InvalidInput
    pub fn compare(&self, strategies: &[Strategy]) -> Result<ComparisonOutcome, EngineError> {
        if strategies.len() < 2 {
            return Err(EngineError::InvalidInput(format!(
                "comparison requires at least 2 strategies, got {}",
                strategies.len()
            )));
        }
        let scored = strategies
            .iter()
            .map(|s| (s.clone(), self.scorer.evaluate(s)))
            .collect();
        self.compare_scored(scored)
    }

    /// 比较已评分的候选（输入不会被修改，只会被移动进结果）
    pub fn compare_scored(
        &self,
        scored: Vec<(Strategy, Score)>,
    ) -> Result<ComparisonOutcome, EngineError> {
        if scored.len() < 2 {
            return Err(EngineError::InvalidInput(format!(
                "comparison requires at least 2 strategies, got {}",
                scored.len()
            )));
        }

        let mut ranked: Vec<RankedCandidate> = scored
            .into_iter()
            .enumerate()
            .map(|(index, (strategy, score))| RankedCandidate {
                index,
                strategy,
                score,
            })
            .collect();
        // sort_by 为稳定排序
        ranked.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));

        let best = ranked[0].confidence();
        let runner_up = ranked[1].confidence();

        if best < self.min_acceptance {
            return Ok(ComparisonOutcome::NoWinner {
                reason: format!(
                    "no strategy reached the minimum score {:.2} (best {:.2})",
                    self.min_acceptance, best
                ),
                ranked,
            });
        }

        if round_cents(best - runner_up) < self.min_margin {
            let contenders: Vec<&RankedCandidate> = ranked
                .iter()
                .filter(|c| round_cents(best - c.confidence()) < self.min_margin)
                .collect();
            return Ok(match tie_break(&contenders) {
                Some((winner_index, decided_by)) => ComparisonOutcome::WinnerByTiebreak {
                    winner_index,
                    decided_by,
                    ranked,
                },
                None => ComparisonOutcome::Tie {
                    best_confidence: best,
                    runner_up_confidence: runner_up,
                    ranked,
                },
            });
        }

        Ok(ComparisonOutcome::Winner {
            winner_index: ranked[0].index,
            winner_confidence: best,
            runner_up_confidence: runner_up,
            ranked,
        })
    }
}

fn risk_key(c: &RankedCandidate) -> usize {
    c.score.risk_tier.rank() as usize
}

fn flag_key(c: &RankedCandidate) -> usize {
    c.score.flag_count()
}

fn field_key(c: &RankedCandidate) -> usize {
    c.strategy.populated_field_count()
}

/// 依次应用判据，每一步只保留取值最小的候选；剩一个即为胜者
fn tie_break(contenders: &[&RankedCandidate]) -> Option<(usize, TieBreaker)> {
    let cascade: [(TieBreaker, fn(&RankedCandidate) -> usize); 3] = [
        (TieBreaker::RiskTier, risk_key),
        (TieBreaker::FlagCount, flag_key),
        (TieBreaker::FieldCount, field_key),
    ];

    let mut pool: Vec<&RankedCandidate> = contenders.to_vec();
    for (breaker, key) in cascade {
        let min = pool.iter().map(|c| key(c)).min()?;
        pool.retain(|c| key(c) == min);
        if pool.len() == 1 {
            return Some((pool[0].index, breaker));
        }
    }
    None
}
