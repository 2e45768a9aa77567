mod anthropic;
mod chain;
mod mock;
mod openai;
mod prompt;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use chain::{ChainConfig, ClassifyError, FallbackChain};
pub use mock::RuleBasedProvider;
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use prompt::SUPPORTED_CATEGORIES;

use models::{ClassifyHints, DocumentMetadata};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider is not configured")]
    NotConfigured,
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("provider response was malformed: {0}")]
    MalformedResponse(String),
    #[error("classification failed validation: {0}")]
    Invalid(#[from] models::MetadataError),
}

impl ProviderError {
    /// Whether retrying the same provider can plausibly help.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Request(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::NotConfigured
            | ProviderError::MalformedResponse(_)
            | ProviderError::Invalid(_) => false,
        }
    }
}

/// A classification provider. Implementations are pluggable; the fallback
/// chain tries them in configured order.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// False when required credentials are absent; the chain skips such
    /// providers without counting a failure.
    fn is_configured(&self) -> bool;

    fn supported_categories(&self) -> &'static [&'static str] {
        SUPPORTED_CATEGORIES
    }

    async fn classify(
        &self,
        text: &str,
        hints: &ClassifyHints,
    ) -> Result<DocumentMetadata, ProviderError>;
}

/// The synthetic result used when there is nothing to classify or every
/// provider failed: caller-declared hints are preserved, confidence is
/// floored, and the document is flagged as not AI-classified.
pub fn degraded_result(document_name: &str, hints: &ClassifyHints) -> DocumentMetadata {
    let mut metadata = DocumentMetadata::low_confidence_default(document_name);
    prompt::apply_hints(&mut metadata, hints);
    metadata
}
