mod accumulator;
mod config;
mod engine;
mod error;
mod input;
mod provider;
mod request;
mod stream;

pub use accumulator::{Accumulator, AnalysisResult, RenderFrame};
pub use config::{
    CURSOR_MARKER, DEFAULT_API_BASE, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, OculusConfig,
    PromptTemplate,
};
pub use engine::{AnalysisOrchestrator, AnalysisState, RenderEvent, Renderer};
pub use error::{MissingInput, OculusError, Result};
pub use input::{Credential, ImageFormat, ImageUpload, InputCollector};
pub use provider::{FragmentStream, InferenceProvider, OpenAiProvider};
pub use request::{AnalysisRequest, ChatCompletionRequest, ChatMessage, ContentPart, ImageUrl, Role};
pub use stream::{SseDecoder, SseEvent, StreamFragment, decode_chunk, fragments};

pub use tokio_util::sync::CancellationToken;
