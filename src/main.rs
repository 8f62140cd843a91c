//! Growth Engine 命令行
//!
//! 入口：初始化日志、加载配置与投放明细，分析出最佳细分人群后运行一次决策流水线，
//! 以 JSON 打印报告。用法：`growth-engine [records.json]`

use std::path::PathBuf;

use anyhow::Context;
use growth_engine::config::{load_config, AppConfig};
use growth_engine::core::EngineBuilder;
use growth_engine::insight::{demo_records, find_winning_segment, load_records};
use growth_engine::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config not loaded ({}), using defaults", e);
        AppConfig::default()
    });

    let records_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.records_path());
    let records = if records_path.exists() {
        load_records(&records_path)
            .with_context(|| format!("Failed to read records from {}", records_path.display()))?
    } else {
        tracing::warn!(
            "{} not found, using built-in demo records",
            records_path.display()
        );
        demo_records()
    };

    let insight = find_winning_segment(&records).context("Analysis failed")?;

    let pipeline = EngineBuilder::new(cfg)
        .build()
        .context("Failed to build decision engine")?;
    let report = pipeline.run(&insight).await.context("Decision run failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
