use super::{prompt, Provider, ProviderError};
use models::{ClassifyHints, DocumentMetadata};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    /// Absent key means the provider reports itself unconfigured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "OpenAiConfig::default_model")]
    pub model: String,
    #[serde(default = "OpenAiConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "OpenAiConfig::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "OpenAiConfig::default_temperature")]
    pub temperature: f32,
    #[serde(default = "OpenAiConfig::default_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: Self::default_model(),
            base_url: Self::default_base_url(),
            max_tokens: Self::default_max_tokens(),
            temperature: Self::default_temperature(),
            timeout: Self::default_timeout(),
        }
    }
}

impl OpenAiConfig {
    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }
    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }
    fn default_max_tokens() -> u32 {
        1_500
    }
    fn default_temperature() -> f32 {
        0.1
    }
    fn default_timeout() -> Duration {
        Duration::from_secs(60)
    }
}

/// Chat-completions provider; works against OpenAI and any API-compatible
/// gateway via `base_url`.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt_text,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(api_key)
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

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| ProviderError::MalformedResponse("empty choices".to_string()))?;

        let llm = prompt::parse_llm_json(content)?;
        Ok(prompt::into_metadata(llm, hints.file_name.as_deref().unwrap_or("document"), hints))
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut cut = max.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s[..cut].to_string()
}
