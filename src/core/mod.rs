//! 核心编排层：错误类型、探索广度策略、编排器、流水线与装配

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod policy;

pub use builder::{create_generator_from_config, create_long_term_store, EngineBuilder};
pub use error::EngineError;
pub use orchestrator::{Approval, BlockReason, Blocked, Orchestrator, Verdict};
pub use pipeline::{campaign_name, PersistenceReport, Pipeline, PipelineReport};
pub use policy::{BreadthDecision, BreadthPolicy, BreadthRule};
