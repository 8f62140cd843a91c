//! 引擎构建器：根据配置装配生成器、记忆后端、策略仓库与流水线
//!
//! 命令行与测试共用同一套装配逻辑。

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, MemoryBackend};
use crate::core::{EngineError, Orchestrator, Pipeline};
use crate::generator::{CandidateSource, MockGenerator, OpenAiGenerator, StrategyGenerator};
use crate::memory::{
    InMemoryLongTermStore, JsonLongTermStore, LongTermStore, MemoryAgent, MemoryPolicy,
    SqliteLongTermStore,
};
use crate::persistence::{SqliteStrategyRepository, StrategyRepository};

/// 按 provider 选择生成器；openai 需要 OPENAI_API_KEY，否则回退到 Mock
pub fn create_generator_from_config(cfg: &AppConfig) -> Arc<dyn StrategyGenerator> {
    let provider = cfg.generator.provider.to_lowercase();
    let has_key = std::env::var("OPENAI_API_KEY").is_ok();

    if provider == "openai" && has_key {
        tracing::info!("Using OpenAI generator ({})", cfg.generator.model);
        Arc::new(OpenAiGenerator::new(
            cfg.generator.base_url.as_deref(),
            &cfg.generator.model,
            None,
        ))
    } else {
        if provider == "openai" {
            tracing::warn!("OPENAI_API_KEY not set, using mock generator");
        } else {
            tracing::info!("Using mock generator");
        }
        Arc::new(MockGenerator::new())
    }
}

/// 按 [memory].backend 打开长期记忆存储
pub fn create_long_term_store(cfg: &AppConfig) -> Result<Arc<dyn LongTermStore>, EngineError> {
    let store: Arc<dyn LongTermStore> = match cfg.memory.backend {
        MemoryBackend::Json => Arc::new(JsonLongTermStore::open(cfg.long_term_memory_path())?),
        MemoryBackend::Sqlite => Arc::new(SqliteLongTermStore::open(cfg.long_term_memory_path())?),
        MemoryBackend::Memory => Arc::new(InMemoryLongTermStore::new()),
    };
    Ok(store)
}

pub struct EngineBuilder {
    config: AppConfig,
    generator: Option<Arc<dyn StrategyGenerator>>,
    store: Option<Arc<dyn LongTermStore>>,
    repository: Option<Arc<dyn StrategyRepository>>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            generator: None,
            store: None,
            repository: None,
        }
    }

    /// 指定生成器（否则由配置决定）
    pub fn with_generator(mut self, generator: Arc<dyn StrategyGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// 指定长期记忆存储（否则由配置决定）
    pub fn with_long_term_store(mut self, store: Arc<dyn LongTermStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 指定策略仓库（否则在 [persistence].enabled 时打开 SQLite）
    pub fn with_repository(mut self, repository: Arc<dyn StrategyRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_memory(&self) -> Result<MemoryAgent, EngineError> {
        let store = match &self.store {
            Some(store) => Arc::clone(store),
            None => create_long_term_store(&self.config)?,
        };
        let engine = &self.config.engine;
        let policy = MemoryPolicy {
            learning_threshold: engine.learning_threshold,
            acceptance_threshold: engine.acceptance_threshold,
            neutral_prior: engine.neutral_prior,
        };
        MemoryAgent::open(store, self.config.memory.short_term_capacity, policy)
    }

    pub fn build_source(&self) -> CandidateSource {
        let generator = match &self.generator {
            Some(generator) => Arc::clone(generator),
            None => create_generator_from_config(&self.config),
        };
        let gen_cfg = &self.config.generator;
        CandidateSource::new(generator, Duration::from_secs(gen_cfg.timeout_secs))
            .with_fallback(gen_cfg.fallback_on_error)
            .with_concurrency(gen_cfg.concurrent)
    }

    pub fn build_orchestrator(&self) -> Result<Orchestrator, EngineError> {
        let memory = Arc::new(self.build_memory()?);
        Ok(Orchestrator::from_config(
            &self.config.engine,
            memory,
            self.build_source(),
        ))
    }

    pub fn build(self) -> Result<Pipeline, EngineError> {
        let mut pipeline = Pipeline::new(self.build_orchestrator()?);
        let repository: Option<Arc<dyn StrategyRepository>> = match self.repository {
            Some(repository) => Some(repository),
            None if self.config.persistence.enabled => Some(Arc::new(
                SqliteStrategyRepository::open(self.config.database_path())?,
            )),
            None => None,
        };
        if let Some(repository) = repository {
            pipeline = pipeline.with_repository(repository);
        }
        Ok(pipeline)
    }
}
