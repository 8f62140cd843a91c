//! 持久化边界：批准后的策略写入关系型存储（尽力而为，不影响已做出的决策）

pub mod feedback;
pub mod repository;

pub use feedback::{simulate_feedback, SimulatedFeedback};
pub use repository::{SavedStrategy, SqliteStrategyRepository, StoredStrategy, StrategyRepository};
