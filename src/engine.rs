use crate::accumulator::{Accumulator, AnalysisResult, RenderFrame};
use crate::config::OculusConfig;
use crate::error::{OculusError, Result};
use crate::input::InputCollector;
use crate::provider::InferenceProvider;
use crate::request::AnalysisRequest;
use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Represents the current state of the analysis orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisState {
    /// Waiting for a submission.
    Idle,
    /// Inputs accepted, the payload is being built.
    Submitting,
    /// The streaming call is open and fragments are being rendered.
    Streaming,
    /// The stream ended and the final text was rendered.
    Completed,
    /// The call failed, timed out or was cancelled.
    Failed,
}

impl AnalysisState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisState::Idle => "idle",
            AnalysisState::Submitting => "submitting",
            AnalysisState::Streaming => "streaming",
            AnalysisState::Completed => "completed",
            AnalysisState::Failed => "failed",
        }
    }

    /// Returns true while a request is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, AnalysisState::Submitting | AnalysisState::Streaming)
    }
}

/// Everything the orchestrator asks the user interface to show.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderEvent {
    /// The orchestrator moved to a new state.
    State(AnalysisState),
    /// Replace the output area with this frame.
    Frame(RenderFrame),
    /// Non-fatal notice, e.g. a missing input.
    Warning(String),
    /// The analysis finished successfully.
    Completed(AnalysisResult),
    /// The analysis failed with this message.
    Failed(String),
}

/// Sink for render events.
pub trait Renderer {
    /// Shows one event. Called in the order the events happen.
    fn render(&mut self, event: RenderEvent);
}

impl Renderer for Vec<RenderEvent> {
    fn render(&mut self, event: RenderEvent) {
        self.push(event);
    }
}

impl Renderer for tokio::sync::mpsc::UnboundedSender<RenderEvent> {
    fn render(&mut self, event: RenderEvent) {
        // the receiver may already be gone; nothing left to show then
        let _ = self.send(event);
    }
}

/// Marks the analysis as failed if the `submit` future is dropped before it
/// reaches a terminal state.
struct InFlight<'a> {
    state: &'a Mutex<AnalysisState>,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(state: &'a Mutex<AnalysisState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::warn!("Analysis dropped before completion");
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = AnalysisState::Failed;
        }
    }
}

/// Drives one analysis at a time from submission to a terminal state.
pub struct AnalysisOrchestrator<P: InferenceProvider> {
    provider: P,
    config: OculusConfig,
    state: Arc<Mutex<AnalysisState>>,
}

impl<P: InferenceProvider> AnalysisOrchestrator<P> {
    /// Creates an idle orchestrator.
    ///
    /// # Arguments
    /// * `provider` - The backend that streams the generated text
    /// * `config` - Model, token limit, timeout and prompt used for every submission
    pub fn new(provider: P, config: OculusConfig) -> Self {
        Self {
            provider,
            config,
            state: Arc::new(Mutex::new(AnalysisState::Idle)),
        }
    }

    /// Returns the configuration used to build each request.
    pub fn config(&self) -> &OculusConfig {
        &self.config
    }

    /// Returns the inference provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns the current state of the orchestrator.
    pub fn state(&self) -> AnalysisState {
        *self.lock_state()
    }

    /// Submits the collected inputs and streams the analysis into `renderer`.
    ///
    /// Missing inputs produce a warning and leave the orchestrator idle. A
    /// submission while another one is in flight is rejected with
    /// [`OculusError::Busy`] without touching the running analysis.
    pub async fn submit<R>(
        &self,
        input: &InputCollector,
        renderer: &mut R,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult>
    where
        R: Renderer + ?Sized,
    {
        let request = {
            let mut state = self.lock_state();
            if state.is_active() {
                log::warn!("Rejected a submission while {}", state.as_str());
                drop(state);
                let err = OculusError::Busy;
                renderer.render(RenderEvent::Warning(err.to_string()));
                return Err(err);
            }

            *state = AnalysisState::Idle;
            match input.submit() {
                Ok(request) => {
                    *state = AnalysisState::Submitting;
                    Ok(request)
                }
                Err(err) => Err(err),
            }
        };

        renderer.render(RenderEvent::State(AnalysisState::Idle));
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                log::warn!("Submission incomplete: {}", err);
                renderer.render(RenderEvent::Warning(err.to_string()));
                return Err(err);
            }
        };
        renderer.render(RenderEvent::State(AnalysisState::Submitting));

        let mut in_flight = InFlight::new(&self.state);
        let outcome = self.run(&request, renderer, cancel).await;
        in_flight.disarm();
        self.finish(outcome, renderer)
    }

    async fn run<R>(
        &self,
        request: &AnalysisRequest,
        renderer: &mut R,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult>
    where
        R: Renderer + ?Sized,
    {
        let work = self.stream_into(request, renderer);
        let bounded = async {
            match self.config.timeout {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .unwrap_or_else(|_| Err(OculusError::Timeout(limit))),
                None => work.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OculusError::Cancelled),
            outcome = bounded => outcome,
        }
    }

    async fn stream_into<R>(
        &self,
        request: &AnalysisRequest,
        renderer: &mut R,
    ) -> Result<AnalysisResult>
    where
        R: Renderer + ?Sized,
    {
        let payload = request.to_chat_request(&self.config);

        self.transition(AnalysisState::Streaming, renderer);
        log::debug!("Streaming analysis from {}", self.provider.name());

        let mut fragments = self
            .provider
            .stream(&payload, request.credential())
            .await?;

        let mut accumulator = Accumulator::new();
        while let Some(fragment) = fragments.next().await {
            let frame = accumulator.push(&fragment?);
            renderer.render(RenderEvent::Frame(frame));
        }

        Ok(accumulator.finish())
    }

    fn finish<R>(
        &self,
        outcome: Result<AnalysisResult>,
        renderer: &mut R,
    ) -> Result<AnalysisResult>
    where
        R: Renderer + ?Sized,
    {
        match outcome {
            Ok(result) => {
                log::info!(
                    "Analysis completed ({} fragments, {} bytes)",
                    result.fragments,
                    result.text.len()
                );
                renderer.render(RenderEvent::Frame(RenderFrame::complete(&result.text)));
                self.transition(AnalysisState::Completed, renderer);
                renderer.render(RenderEvent::Completed(result.clone()));
                Ok(result)
            }
            Err(err) => {
                log::error!("Analysis failed: {}", err);
                self.transition(AnalysisState::Failed, renderer);
                renderer.render(RenderEvent::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    fn transition<R>(&self, next: AnalysisState, renderer: &mut R)
    where
        R: Renderer + ?Sized,
    {
        *self.lock_state() = next;
        log::debug!("Analysis state: {}", next.as_str());
        renderer.render(RenderEvent::State(next));
    }

    fn lock_state(&self) -> MutexGuard<'_, AnalysisState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
