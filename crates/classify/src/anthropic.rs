use super::{openai::truncate, prompt, Provider, ProviderError};
use models::{ClassifyHints, DocumentMetadata};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnthropicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "AnthropicConfig::default_model")]
    pub model: String,
    #[serde(default = "AnthropicConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "AnthropicConfig::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "AnthropicConfig::default_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: Self::default_model(),
            base_url: Self::default_base_url(),
            max_tokens: Self::default_max_tokens(),
            timeout: Self::default_timeout(),
        }
    }
}

impl AnthropicConfig {
    fn default_model() -> String {
        "claude-3-5-haiku-latest".to_string()
    }
    fn default_base_url() -> String {
        "https://api.anthropic.com".to_string()
    }
    fn default_max_tokens() -> u32 {
        1_500
    }
    fn default_timeout() -> Duration {
        Duration::from_secs(60)
    }
}

/// Messages-API provider.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    #[tracing::instrument(skip_all, fields(model = %self.config.model))]
    async fn classify(
        &self,
        text: &str,
        hints: &ClassifyHints,
    ) -> Result<DocumentMetadata, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let prompt_text = prompt::classification_prompt(text, hints);
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![Message {
                role: "user",
                content: &prompt_text,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: truncate(&message, 500),
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let content = parsed
            .content
            .iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .ok_or_else(|| ProviderError::MalformedResponse("no text block".to_string()))?;

        let llm = prompt::parse_llm_json(content)?;
        Ok(prompt::into_metadata(
            llm,
            hints.file_name.as_deref().unwrap_or("document"),
            hints,
        ))
    }
}
