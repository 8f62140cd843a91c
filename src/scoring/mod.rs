//! 评分层：确定性评分器与 A/B 比较器

pub mod comparator;
pub mod scorer;

pub use comparator::{ComparisonOutcome, Comparator, RankedCandidate, TieBreaker};
pub use scorer::{round_cents, RiskTier, Score, ScoreFlag, Scorer};
