use crate::config::OculusConfig;
use crate::input::{Credential, ImageUpload};
use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;

/// Everything one submission needs. Built by [`crate::InputCollector::submit`]
/// and read-only afterwards.
#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    image: ImageUpload,
    context: Option<String>,
    credential: Credential,
}

impl AnalysisRequest {
    /// Creates a request. Prefer [`crate::InputCollector::submit`], which checks the inputs.
    pub fn new(image: ImageUpload, context: Option<String>, credential: Credential) -> Self {
        Self {
            image,
            context,
            credential,
        }
    }

    /// Returns the image to analyze.
    pub fn image(&self) -> &ImageUpload {
        &self.image
    }

    /// Returns the user context, if the user opted in.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the credential for this call.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Encodes the image as a base64 data URI.
    pub fn image_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.image.format.mime(),
            general_purpose::STANDARD.encode(&self.image.bytes)
        )
    }

    /// Builds the chat completion payload for this request.
    pub fn to_chat_request(&self, config: &OculusConfig) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: config.model.clone(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: vec![
                    ContentPart::Text {
                        text: config.prompt.render(self.context()),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: self.image_data_uri(),
                        },
                    },
                ],
            }],
            max_tokens: config.max_tokens,
            stream: true,
        }
    }
}

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking for the analysis.
    User,
}

/// Image reference; here always a base64 data URI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageUrl {
    /// `data:<mime>;base64,<payload>`.
    pub url: String,
}

/// One typed part of a message's content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Serialized as `{"type": "text", "text": ...}`.
    Text { text: String },
    /// Serialized as `{"type": "image_url", "image_url": {"url": ...}}`.
    ImageUrl { image_url: ImageUrl },
}

/// One message of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// Instruction text followed by the image.
    pub content: Vec<ContentPart>,
}

/// Body of a streaming chat completion call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,
    /// The conversation; a single user message.
    pub messages: Vec<ChatMessage>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Always `true`; fragments arrive as server-sent events.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// The instruction text of the first message, if any.
    pub fn instruction(&self) -> Option<&str> {
        self.messages
            .first()?
            .content
            .iter()
            .find_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ImageFormat;
    use serde_json::json;

    fn request(context: Option<&str>) -> AnalysisRequest {
        AnalysisRequest::new(
            ImageUpload::new("dot.png", ImageFormat::Png, vec![1, 2, 3]),
            context.map(str::to_string),
            Credential::new("sk-test").unwrap(),
        )
    }

    #[test]
    fn data_uri_uses_image_mime() {
        assert_eq!(request(None).image_data_uri(), "data:image/png;base64,AQID");
    }

    #[test]
    fn payload_shape() {
        let config = OculusConfig::default();
        let body = serde_json::to_value(request(None).to_chat_request(&config)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": config.prompt.instruction },
                        { "type": "image_url", "image_url": { "url": "data:image/png;base64,AQID" } }
                    ]
                }],
                "max_tokens": 1200,
                "stream": true
            })
        );
    }

    #[test]
    fn context_is_appended_to_instruction() {
        let config = OculusConfig::default();
        let chat = request(Some("a museum photo")).to_chat_request(&config);
        let instruction = chat.instruction().unwrap();
        assert!(instruction.starts_with(&config.prompt.instruction));
        assert!(instruction.ends_with("a museum photo"));

        let chat = request(None).to_chat_request(&config);
        assert_eq!(chat.instruction(), Some(config.prompt.instruction.as_str()));
    }

    #[test]
    fn debug_does_not_leak_credential() {
        let debug = format!("{:?}", request(None));
        assert!(!debug.contains("sk-test"));
    }
}
