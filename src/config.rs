use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base URL of the chat completion API.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default multimodal model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Upper bound on generated tokens per analysis.
pub const DEFAULT_MAX_TOKENS: u32 = 1200;

/// Marker appended to the partial text while the stream is still open.
pub const CURSOR_MARKER: &str = "▌";

/// The instruction sent along with every image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Fixed instruction asking for a detailed description in the target language.
    pub instruction: String,
    /// Label placed before the user supplied context.
    pub context_label: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            instruction: "Describe detalladamente lo que ves en la imagen en español.".to_string(),
            context_label: "Contexto adicional proporcionado por el usuario:".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Builds the instruction text, appending the context as a labeled block
    /// when one is given.
    ///
    /// A blank context leaves the instruction untouched.
    pub fn render(&self, context: Option<&str>) -> String {
        match context.filter(|c| !c.trim().is_empty()) {
            Some(context) => format!(
                "{}\n\n{}\n{}",
                self.instruction, self.context_label, context
            ),
            None => self.instruction.clone(),
        }
    }
}

/// Request scoped settings for talking to the inference provider.
///
/// The credential travels with each [`crate::AnalysisRequest`] instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OculusConfig {
    /// Base URL of the chat completion API, without the trailing endpoint.
    pub api_base: String,
    /// Model identifier.
    pub model: String,
    /// Maximum number of tokens the provider may generate.
    pub max_tokens: u32,
    /// Deadline for the whole analysis. `None` waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Instruction template.
    #[serde(default)]
    pub prompt: PromptTemplate,
}

impl Default for OculusConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: None,
            prompt: PromptTemplate::default(),
        }
    }
}

impl OculusConfig {
    /// Sets the base URL, e.g. `http://localhost:8080/v1` for a local server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the maximum number of generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Bounds the whole analysis, from connecting to the end of the stream.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replaces the instruction template.
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    /// Full URL of the chat completion endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_without_context_is_unmodified() {
        let prompt = PromptTemplate::default();
        assert_eq!(prompt.render(None), prompt.instruction);
        assert_eq!(prompt.render(Some("")), prompt.instruction);
        assert_eq!(prompt.render(Some("   ")), prompt.instruction);
    }

    #[test]
    fn prompt_with_context_ends_with_context() {
        let prompt = PromptTemplate::default();
        let text = prompt.render(Some("Taken at a nature art exhibition"));
        assert!(text.starts_with(&prompt.instruction));
        assert!(text.contains(&prompt.context_label));
        assert!(text.ends_with("Taken at a nature art exhibition"));
    }

    #[test]
    fn completions_url_strips_trailing_slash() {
        let config = OculusConfig::default().with_api_base("http://localhost:8080/v1/");
        assert_eq!(
            config.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn defaults() {
        let config = OculusConfig::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 1200);
        assert!(config.timeout.is_none());
    }
}
