//! 记忆层：短期（最近执行窗口）、长期（跨重启累计统计）、协调者与只读快照

pub mod agent;
pub mod long_term;
pub mod short_term;
pub mod sqlite_store;

pub use agent::{MemoryAgent, MemoryMode, MemoryPolicy, MemorySnapshot, SNAPSHOT_VERSION};
pub use long_term::{
    GlobalStats, InMemoryLongTermStore, JsonLongTermStore, LongTermStats, LongTermStore,
    SuccessSample,
};
pub use short_term::{ExecutionRecord, ShortTermMemory};
pub use sqlite_store::SqliteLongTermStore;
