use kornia_oculus::RenderEvent;
use serde::{Deserialize, Serialize};

/// One line of the NDJSON body streamed by `POST /analyze`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisFrame {
    State { state: String },
    Frame { text: String, cursor: bool },
    Warning { message: String },
    Completed { text: String, fragments: usize },
    Failed { message: String },
}

impl From<RenderEvent> for AnalysisFrame {
    fn from(event: RenderEvent) -> Self {
        match event {
            RenderEvent::State(state) => AnalysisFrame::State {
                state: state.as_str().to_string(),
            },
            RenderEvent::Frame(frame) => AnalysisFrame::Frame {
                text: frame.text,
                cursor: frame.cursor,
            },
            RenderEvent::Warning(message) => AnalysisFrame::Warning { message },
            RenderEvent::Completed(result) => AnalysisFrame::Completed {
                text: result.text,
                fragments: result.fragments,
            },
            RenderEvent::Failed(message) => AnalysisFrame::Failed { message },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateResponse {
    pub state: String,
}
