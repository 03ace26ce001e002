//! The extraction collaborator: page images in, raw model text out.
//!
//! [`CardExtractor`] is the seam between the pipeline and whatever turns
//! images into question/answer text. Production code uses
//! [`VisionExtractor`], a thin wrapper over an `edgequake-llm` provider;
//! tests plug in canned replies.
//!
//! No retries and no timeout at this layer: a failed call surfaces as
//! [`Pdf2AnkiError::Upstream`] and the upload fails.

use crate::config::ConversionConfig;
use crate::error::Pdf2AnkiError;
use crate::pipeline::encode::EncodedImage;
use crate::prompts::{FLASHCARD_INSTRUCTION, SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Turns a batch of page images into the model's raw reply text.
#[async_trait]
pub trait CardExtractor: Send + Sync {
    /// All images of one upload are sent together, in page order.
    async fn extract(&self, images: &[EncodedImage]) -> Result<String, Pdf2AnkiError>;
}

/// [`CardExtractor`] backed by a vision-capable chat model.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    instruction: String,
    options: CompletionOptions,
}

impl VisionExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
            instruction: config
                .instruction
                .clone()
                .unwrap_or_else(|| FLASHCARD_INSTRUCTION.to_string()),
            options: build_options(config),
        }
    }

    /// Resolve a provider from `config` and the environment, then wrap it.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2AnkiError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    /// Build the system + user message pair for one request.
    fn build_messages(&self, images: &[EncodedImage]) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(
                self.instruction.as_str(),
                images.iter().map(EncodedImage::to_image_data).collect(),
            ),
        ]
    }
}

#[async_trait]
impl CardExtractor for VisionExtractor {
    async fn extract(&self, images: &[EncodedImage]) -> Result<String, Pdf2AnkiError> {
        if images.is_empty() {
            return Err(Pdf2AnkiError::Internal(
                "extract called without any page images".into(),
            ));
        }

        let start = Instant::now();
        let messages = self.build_messages(images);
        info!("Sending {} page image(s) to the model", images.len());

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| Pdf2AnkiError::Upstream {
                message: e.to_string(),
            })?;

        debug!(
            "Model replied: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        let preview: String = response.content.chars().take(100).collect();
        debug!("Reply preview: {}…", preview);

        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2AnkiError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2AnkiError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider in `config.provider`;
/// 2. `config.provider_name` with `config.model`;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set;
/// 4. OpenAI when `OPENAI_API_KEY` is set;
/// 5. whatever `ProviderFactory::from_env` detects.
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2AnkiError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2AnkiError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ConversionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4000));
    }

    #[test]
    fn build_options_follow_builder() {
        let config = ConversionConfig::builder()
            .temperature(0.7)
            .max_tokens(1234)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.7));
        assert_eq!(opts.max_tokens, Some(1234));
    }
}
