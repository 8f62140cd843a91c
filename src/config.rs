//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GROWTH__*` 覆盖（双下划线表示嵌套，如 `GROWTH__ENGINE__ACCEPTANCE_THRESHOLD=0.65`）。
//! 所有策略阈值都是具名、可覆盖的配置项，默认值即引擎的标准取值。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
}

/// [app] 段：应用名、数据目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 数据目录，默认 ./data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// 分析用的投放数据（JSON 记录数组）；未设置时用 data_dir/campaign_data.json
    pub records_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            data_dir: default_data_dir(),
            records_path: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// [engine] 段：平台、目标，以及探索广度 / 比较 / 闸门的全部阈值
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_objective")]
    pub objective: String,
    /// 低于此置信度的策略被拦截（比较器最低接受分同用此值）
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    /// 第一名与第二名的最小分差
    #[serde(default = "default_min_margin")]
    pub min_margin: f64,
    /// 达到此置信度才写入长期记忆
    #[serde(default = "default_learning_threshold")]
    pub learning_threshold: f64,
    /// 无历史时的平均置信度
    #[serde(default = "default_neutral_prior")]
    pub neutral_prior: f64,
    /// 执行数低于此值视为冷启动
    #[serde(default = "default_cold_start_executions")]
    pub cold_start_executions: u64,
    /// 比较结果为 TIE 时，执行数低于此值则接受排名第一者作为基线
    #[serde(default = "default_tie_baseline_executions")]
    pub tie_baseline_executions: u64,
    /// 波动检测所需的最少近期样本数
    #[serde(default = "default_instability_min_samples")]
    pub instability_min_samples: usize,
    /// 近期极差超过此值视为不稳定
    #[serde(default = "default_instability_spread")]
    pub instability_spread: f64,
    #[serde(default = "default_high_trust_avg")]
    pub high_trust_avg: f64,
    #[serde(default = "default_high_trust_min_executions")]
    pub high_trust_min_executions: u64,
    #[serde(default = "default_moderate_trust_avg")]
    pub moderate_trust_avg: f64,
    #[serde(default)]
    pub breadth: BreadthSection,
}

fn default_platform() -> String {
    "meta_ads".to_string()
}

fn default_objective() -> String {
    "leads".to_string()
}

fn default_acceptance_threshold() -> f64 {
    0.6
}

fn default_min_margin() -> f64 {
    0.05
}

fn default_learning_threshold() -> f64 {
    0.7
}

fn default_neutral_prior() -> f64 {
    0.6
}

fn default_cold_start_executions() -> u64 {
    3
}

fn default_tie_baseline_executions() -> u64 {
    5
}

fn default_instability_min_samples() -> usize {
    3
}

fn default_instability_spread() -> f64 {
    0.15
}

fn default_high_trust_avg() -> f64 {
    0.85
}

fn default_high_trust_min_executions() -> u64 {
    5
}

fn default_moderate_trust_avg() -> f64 {
    0.7
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            objective: default_objective(),
            acceptance_threshold: default_acceptance_threshold(),
            min_margin: default_min_margin(),
            learning_threshold: default_learning_threshold(),
            neutral_prior: default_neutral_prior(),
            cold_start_executions: default_cold_start_executions(),
            tie_baseline_executions: default_tie_baseline_executions(),
            instability_min_samples: default_instability_min_samples(),
            instability_spread: default_instability_spread(),
            high_trust_avg: default_high_trust_avg(),
            high_trust_min_executions: default_high_trust_min_executions(),
            moderate_trust_avg: default_moderate_trust_avg(),
            breadth: BreadthSection::default(),
        }
    }
}

/// [engine.breadth] 段：每条广度规则命中时生成的候选数
#[derive(Debug, Clone, Deserialize)]
pub struct BreadthSection {
    #[serde(default = "default_two")]
    pub cold_start: usize,
    #[serde(default = "default_two")]
    pub unstable: usize,
    #[serde(default = "default_one")]
    pub high_trust: usize,
    #[serde(default = "default_two")]
    pub moderate_trust: usize,
    #[serde(default = "default_three")]
    pub low_trust: usize,
}

fn default_one() -> usize {
    1
}

fn default_two() -> usize {
    2
}

fn default_three() -> usize {
    3
}

impl Default for BreadthSection {
    fn default() -> Self {
        Self {
            cold_start: 2,
            unstable: 2,
            high_trust: 1,
            moderate_trust: 2,
            low_trust: 3,
        }
    }
}

/// 长期记忆后端
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    #[default]
    Json,
    Sqlite,
    Memory,
}

/// [memory] 段：短期窗口容量、长期记忆后端与位置
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_short_term_capacity")]
    pub short_term_capacity: usize,
    #[serde(default)]
    pub backend: MemoryBackend,
    /// 未设置时：json → data_dir/long_term_memory.json，sqlite → data_dir/long_term_memory.db
    pub path: Option<PathBuf>,
}

fn default_short_term_capacity() -> usize {
    10
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            short_term_capacity: default_short_term_capacity(),
            backend: MemoryBackend::default(),
            path: None,
        }
    }
}

/// [generator] 段：生成器后端、模型、超时与降级策略
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSection {
    /// openai / mock；openai 需要 OPENAI_API_KEY
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次生成超时（秒）
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
    /// 生成失败 / 超时时返回降级候选而非错误
    #[serde(default = "default_true")]
    pub fallback_on_error: bool,
    /// 同一次运行的多个候选并发生成
    #[serde(default = "default_true")]
    pub concurrent: bool,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generator_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeout_secs: default_generator_timeout(),
            fallback_on_error: true,
            concurrent: true,
        }
    }
}

/// [persistence] 段：批准后的策略写入哪里
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 未设置时用 data_dir/growth_engine.db
    pub database_path: Option<PathBuf>,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
        }
    }
}

impl AppConfig {
    pub fn long_term_memory_path(&self) -> PathBuf {
        if let Some(path) = &self.memory.path {
            return path.clone();
        }
        let file = match self.memory.backend {
            MemoryBackend::Sqlite => "long_term_memory.db",
            _ => "long_term_memory.json",
        };
        self.app.data_dir.join(file)
    }

    pub fn database_path(&self) -> PathBuf {
        self.persistence
            .database_path
            .clone()
            .unwrap_or_else(|| self.app.data_dir.join("growth_engine.db"))
    }

    pub fn records_path(&self) -> PathBuf {
        self.app
            .records_path
            .clone()
            .unwrap_or_else(|| self.app.data_dir.join("campaign_data.json"))
    }
}

/// 从 config 目录加载配置，环境变量 GROWTH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GROWTH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GROWTH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_engine_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.acceptance_threshold, 0.6);
        assert_eq!(cfg.engine.learning_threshold, 0.7);
        assert_eq!(cfg.engine.cold_start_executions, 3);
        assert_eq!(cfg.engine.tie_baseline_executions, 5);
        assert_eq!(cfg.engine.breadth.low_trust, 3);
        assert_eq!(cfg.memory.short_term_capacity, 10);
        assert_eq!(cfg.memory.backend, MemoryBackend::Json);
        assert_eq!(
            cfg.long_term_memory_path(),
            PathBuf::from("data/long_term_memory.json")
        );
    }

    #[test]
    fn test_load_config_from_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            r#"
[engine]
acceptance_threshold = 0.65
cold_start_executions = 5

[engine.breadth]
low_trust = 4

[memory]
backend = "sqlite"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.engine.acceptance_threshold, 0.65);
        assert_eq!(cfg.engine.cold_start_executions, 5);
        assert_eq!(cfg.engine.breadth.low_trust, 4);
        assert_eq!(cfg.engine.breadth.high_trust, 1);
        assert_eq!(cfg.engine.min_margin, 0.05);
        assert_eq!(cfg.memory.backend, MemoryBackend::Sqlite);
        assert_eq!(
            cfg.long_term_memory_path(),
            PathBuf::from("data/long_term_memory.db")
        );
    }
}
