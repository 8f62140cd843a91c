//! OpenAI 兼容 API 生成器
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url），
//! 要求模型只返回 JSON，解析为 Strategy 后补齐平台、目标与人口画像。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::core::EngineError;
use crate::generator::StrategyGenerator;
use crate::insight::Insight;
use crate::strategy::Strategy;

const SYSTEM_PROMPT: &str = "Atue como um estrategista de Marketing Sénior. Responda APENAS um JSON válido.";

/// OpenAI 兼容生成器：持有 Client 与 model 名
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

/// 由洞察构造提示词
pub fn build_prompt(insight: &Insight, platform: &str, objective: &str) -> String {
    let demo = &insight.top_demographics;
    format!(
        r#"Analise os dados:
- Público Alvo: {gender}, Faixa Etária {age}
- ROAS: {roas}
- Resumo: {summary}
- Plataforma: {platform}
- Objetivo: {objective}

TAREFA:
1. Defina uma persona curta.
2. Escreva uma DM (Direct Message) convidativa (máx 200 caracteres).
3. Escolha 3 hashtags, interesses, tipo de criativo e posicionamentos.
4. Estime as métricas comportamentais esperadas.

Responda APENAS um JSON válido neste formato:
{{
    "target_audience": "texto...",
    "demographics": {{"age_range": "{age}", "gender": "{gender}", "location": "..."}},
    "interests": ["..."],
    "behavior": {{"expected_roas": 0.0, "conversion_rate": 0.0, "click_volume": 0}},
    "message_template": "texto...",
    "creative_type": "...",
    "placements": ["..."],
    "keywords": ["tag1", "tag2", "tag3"]
}}"#,
        gender = demo.gender,
        age = demo.age_range,
        roas = insight.performance_metrics.roas,
        summary = insight.insight_text,
        platform = platform,
        objective = objective,
    )
}

/// 解析模型输出：容忍 ```json 代码块包裹；缺失的平台 / 目标 / 画像由请求参数补齐
pub fn parse_strategy(
    raw: &str,
    insight: &Insight,
    platform: &str,
    objective: &str,
) -> Result<Strategy, EngineError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let mut strategy: Strategy = serde_json::from_str(body)
        .map_err(|e| EngineError::Generation(format!("invalid strategy JSON: {}", e)))?;

    if strategy.platform.is_none() {
        strategy.platform = Some(platform.to_string());
    }
    if strategy.objective.is_none() {
        strategy.objective = Some(objective.to_string());
    }
    let demo = &insight.top_demographics;
    if strategy.demographics.age_range.is_none() {
        strategy.demographics.age_range = Some(demo.age_range.clone());
    }
    if strategy.demographics.gender.is_none() {
        strategy.demographics.gender = Some(demo.gender.clone());
    }
    // 由引擎写入的字段不接受模型输出
    strategy.status = None;
    strategy.score = None;
    Ok(strategy)
}

fn llm_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::Generation(e.to_string())
}

#[async_trait]
impl StrategyGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        insight: &Insight,
        platform: &str,
        objective: &str,
    ) -> Result<Strategy, EngineError> {
        tracing::info!("Requesting strategy from {} ({})", self.name(), self.model);
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()
                    .map_err(llm_error)?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(build_prompt(insight, platform, objective))
                    .build()
                    .map_err(llm_error)?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(llm_error)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(llm_error)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        parse_strategy(&content, insight, platform, objective)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
