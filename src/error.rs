/// Input that must be present before an analysis can be submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingInput {
    /// No image was uploaded.
    Image,
    /// No credential was entered.
    Credential,
}

impl MissingInput {
    /// Returns the warning shown to the user for this missing input.
    pub fn warning(&self) -> &'static str {
        match self {
            MissingInput::Image => "Please upload an image before analyzing.",
            MissingInput::Credential => "Enter your API key before analyzing.",
        }
    }
}

impl std::fmt::Display for MissingInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.warning())
    }
}

/// Errors raised while collecting input or running an analysis.
#[derive(Debug, thiserror::Error)]
pub enum OculusError {
    /// A required input is missing. Reported as a warning, never as a failure.
    #[error("{0}")]
    MissingInput(MissingInput),

    /// The uploaded file is not one of the accepted image formats.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Another analysis is still in flight.
    #[error("An analysis is already in progress")]
    Busy,

    /// The HTTP request could not be sent or the body could not be read.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    /// A streamed chunk could not be decoded.
    #[error("Malformed stream chunk: {0}")]
    MalformedChunk(#[from] serde_json::Error),

    /// The analysis did not finish within the configured deadline.
    #[error("The analysis timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The analysis was cancelled by the caller.
    #[error("The analysis was cancelled")]
    Cancelled,
}

impl OculusError {
    /// Returns true for errors that are shown as a warning and leave the
    /// orchestrator idle.
    pub fn is_warning(&self) -> bool {
        matches!(self, OculusError::MissingInput(_))
    }
}

pub type Result<T> = std::result::Result<T, OculusError>;
