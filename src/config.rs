//! Configuration types for image/PDF-to-deck conversion and the web server.
//!
//! Conversion behaviour is controlled through [`ConversionConfig`], built via
//! [`ConversionConfigBuilder`]. The HTTP surface has its own
//! [`ServerConfig`]; the CLI maps flags onto both.

use crate::error::Pdf2AnkiError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Upload ceiling enforced by the server: 16 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Configuration for one upload → deck conversion.
///
/// # Example
/// ```rust
/// use pdf2anki::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .model("gpt-4o-mini")
///     .jpeg_quality(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Longest edge, in pixels, of every image sent to the model. Default: 2000.
    ///
    /// Applied to PDF renders and to uploaded photos alike, so a 4000 px
    /// phone picture costs the same as a rendered page.
    pub max_rendered_pixels: u32,

    /// JPEG quality (1–100) for the re-encoded page images. Default: 85.
    pub jpeg_quality: u8,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate for one upload. Default: 4000.
    ///
    /// All pages of a document go out in a single request, so this bounds
    /// the whole deck. Too low and the JSON array is cut off; the parser
    /// then recovers whatever complete prefix survives.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses [`crate::prompts::SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Custom instruction sent alongside the images. If None, uses
    /// [`crate::prompts::FLASHCARD_INSTRUCTION`].
    pub instruction: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Seed for model/deck id generation. None draws from the thread RNG.
    pub id_seed: Option<u64>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 2000,
            jpeg_quality: 85,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4000,
            system_prompt: None,
            instruction: None,
            password: None,
            id_seed: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("id_seed", &self.id_seed)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model name actually used for requests.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn id_seed(mut self, seed: u64) -> Self {
        self.config.id_seed = Some(seed);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2AnkiError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(Pdf2AnkiError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if matches!(c.model.as_deref(), Some("")) {
            return Err(Pdf2AnkiError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}

/// Settings for the HTTP front end.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the server listens on. Default: 127.0.0.1:5000.
    pub bind: SocketAddr,

    /// Directory finished `.apkg` files are delivered to. Default: `uploads`.
    pub output_dir: PathBuf,

    /// Request body ceiling for `/upload`. Default: 16 MiB.
    pub max_upload_bytes: usize,

    /// How often progress streams emit a snapshot. Default: 500 ms.
    pub progress_interval: Duration,

    /// How long a finished job's progress stays subscribable. Default: 60 s.
    pub progress_retention: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            output_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            progress_interval: Duration::from_millis(500),
            progress_retention: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Check the settings that would otherwise fail at request time.
    pub fn validate(&self) -> Result<(), Pdf2AnkiError> {
        if self.max_upload_bytes == 0 {
            return Err(Pdf2AnkiError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if self.progress_interval.is_zero() {
            return Err(Pdf2AnkiError::InvalidConfig(
                "progress interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.max_rendered_pixels, 2000);
        assert_eq!(c.jpeg_quality, 85);
        assert_eq!(c.max_tokens, 4000);
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);

        let s = ServerConfig::default();
        assert_eq!(s.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(s.progress_interval, Duration::from_millis(500));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let c = ConversionConfig::builder()
            .jpeg_quality(0)
            .temperature(9.0)
            .max_rendered_pixels(3)
            .build()
            .unwrap();
        assert_eq!(c.jpeg_quality, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_rendered_pixels, 100);
    }

    #[test]
    fn builder_rejects_zero_tokens_and_empty_model() {
        assert!(ConversionConfig::builder().max_tokens(0).build().is_err());
        assert!(ConversionConfig::builder().model("").build().is_err());
    }

    #[test]
    fn debug_hides_provider() {
        let c = ConversionConfig::builder().model("gpt-4o").build().unwrap();
        let s = format!("{c:?}");
        assert!(s.contains("gpt-4o"));
        assert!(!s.contains("password"));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let s = ServerConfig {
            progress_interval: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(s.validate().is_err());
    }
}
