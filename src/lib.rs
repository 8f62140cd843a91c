//! Growth Engine - 自适应营销策略决策引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、探索广度策略、编排器与流水线
//! - **generator**: 候选策略生成（OpenAI 兼容 / Mock）、超时与降级
//! - **insight**: 投放明细分析，找出表现最好的细分人群
//! - **memory**: 短期执行窗口、长期累计统计（JSON / SQLite）与记忆快照
//! - **observability**: 日志初始化
//! - **persistence**: 批准后的策略仓库与模拟反馈
//! - **scoring**: 评分器与 A/B 比较器
//! - **strategy**: 候选策略数据模型

pub mod config;
pub mod core;
pub mod generator;
pub mod insight;
pub mod memory;
pub mod observability;
pub mod persistence;
pub mod scoring;
pub mod strategy;

pub use crate::core::{EngineError, Orchestrator, Pipeline, PipelineReport, Verdict};
