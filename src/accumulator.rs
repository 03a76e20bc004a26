use crate::config::CURSOR_MARKER;
use crate::stream::StreamFragment;

/// Concatenation of the fragments received so far for the current request.
#[derive(Clone, Debug, Default)]
pub struct Accumulator {
    text: String,
    fragments: usize,
}

impl Accumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment and returns the partial frame to render.
    pub fn push(&mut self, fragment: &StreamFragment) -> RenderFrame {
        self.text.push_str(fragment.as_str());
        self.fragments += 1;
        RenderFrame::partial(&self.text)
    }

    /// Returns the text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the number of fragments received.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Consumes the accumulator into the final result.
    pub fn finish(self) -> AnalysisResult {
        AnalysisResult {
            text: self.text,
            fragments: self.fragments,
        }
    }
}

/// A snapshot of the output area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderFrame {
    /// The accumulated text.
    pub text: String,
    /// Whether the cursor marker follows the text.
    pub cursor: bool,
}

impl RenderFrame {
    /// A frame shown while the stream is still open.
    pub fn partial(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: true,
        }
    }

    /// The final frame, without the cursor.
    pub fn complete(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: false,
        }
    }

    /// Text as displayed, with the cursor marker while streaming.
    pub fn display(&self) -> String {
        if self.cursor {
            format!("{}{}", self.text, CURSOR_MARKER)
        } else {
            self.text.clone()
        }
    }
}

/// The complete output of one successful analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Ordered concatenation of every fragment.
    pub text: String,
    /// Number of fragments that made up the text.
    pub fragments: usize,
}
