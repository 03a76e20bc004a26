use crate::config::OculusConfig;
use crate::error::{OculusError, Result};
use crate::input::Credential;
use crate::request::ChatCompletionRequest;
use crate::stream::{StreamFragment, fragments};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Lazy, finite sequence of fragments for one request. It cannot be restarted.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamFragment>> + Send>>;

/// Trait for the remote service that turns a chat request into streamed text.
///
/// [`OpenAiProvider`] is the HTTP implementation.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Opens a streaming call for the given payload.
    ///
    /// Errors raised while connecting are returned directly; errors raised
    /// later surface as items of the returned stream.
    async fn stream(
        &self,
        payload: &ChatCompletionRequest,
        credential: &Credential,
    ) -> Result<FragmentStream>;
}

/// Chat completion provider speaking the OpenAI streaming protocol over HTTP.
pub struct OpenAiProvider {
    client: reqwest::Client,
    url: String,
}

impl OpenAiProvider {
    /// Creates a provider posting to `config.completions_url()`.
    pub fn new(config: &OculusConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuses an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: &OculusConfig) -> Self {
        Self {
            client,
            url: config.completions_url(),
        }
    }

    /// Returns the chat completion endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl InferenceProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(
        &self,
        payload: &ChatCompletionRequest,
        credential: &Credential,
    ) -> Result<FragmentStream> {
        log::debug!(
            "Opening stream to {} (model: {}, max_tokens: {})",
            self.url,
            payload.model,
            payload.max_tokens
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(credential.expose())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Provider rejected the request with status {}", status);
            return Err(OculusError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(fragments(response.bytes_stream())))
    }
}
