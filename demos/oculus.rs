use argh::FromArgs;
use axum::{
    Json, Router,
    body::Body,
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use kornia_oculus::{
    AnalysisOrchestrator, CancellationToken, ImageUpload, InputCollector, OculusConfig,
    OpenAiProvider, RenderEvent,
};
use serde_json::json;
use std::{convert::Infallible, sync::Arc, time::Duration};

mod messages;

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

const INDEX_PAGE: &str = include_str!("index.html");

#[derive(FromArgs)]
/// Oculus serves a page that describes uploaded images with a multimodal model.
struct OculusArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// base URL of the chat completion API
    #[argh(option, default = "kornia_oculus::DEFAULT_API_BASE.to_string()")]
    api_base: String,

    /// the model used for the analysis
    #[argh(option, short = 'm', default = "kornia_oculus::DEFAULT_MODEL.to_string()")]
    model: String,

    /// maximum number of generated tokens
    #[argh(option, default = "kornia_oculus::DEFAULT_MAX_TOKENS")]
    max_tokens: u32,

    /// abort an analysis after this many seconds
    #[argh(option)]
    timeout_secs: Option<u64>,

    /// API key used when the form leaves it empty (defaults to OPENAI_API_KEY)
    #[argh(option, short = 'k')]
    api_key: Option<String>,
}

struct AppState {
    orchestrator: AnalysisOrchestrator<OpenAiProvider>,
    default_key: Option<String>,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
        .into_response()
}

// Collects the multipart form into the input collector
async fn read_form(
    mut multipart: Multipart,
    default_key: Option<&str>,
) -> Result<InputCollector, String> {
    let mut input = InputCollector::new();
    if let Some(key) = default_key {
        input.set_credential(key);
    }

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                // browsers send an empty part when no file was chosen
                if bytes.is_empty() {
                    continue;
                }
                let image = ImageUpload::from_upload(&file_name, mime.as_deref(), bytes.to_vec())
                    .map_err(|e| e.to_string())?;
                input.set_image(image);
            }
            "context" => {
                input.set_context(field.text().await.map_err(|e| e.to_string())?);
            }
            "context_enabled" => {
                let value = field.text().await.map_err(|e| e.to_string())?;
                input.set_context_enabled(matches!(value.as_str(), "on" | "true" | "1"));
            }
            "api_key" => {
                let value = field.text().await.map_err(|e| e.to_string())?;
                if !value.trim().is_empty() {
                    input.set_credential(value);
                }
            }
            other => log::debug!("Ignoring form field {}", other),
        }
    }

    Ok(input)
}

async fn post_analyze(State(app): State<Arc<AppState>>, multipart: Multipart) -> Response {
    if app.orchestrator.state().is_active() {
        log::debug!("Orchestrator is still streaming");
        return bad_request("An analysis is already in progress");
    }

    let input = match read_form(multipart, app.default_key.as_deref()).await {
        Ok(input) => input,
        Err(error_msg) => return bad_request(error_msg),
    };

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<RenderEvent>();
    let cancel = CancellationToken::new();
    // dropping the response body (client gone) cancels the analysis
    let guard = cancel.clone().drop_guard();

    tokio::spawn({
        let app = app.clone();
        async move {
            let mut tx = tx;
            if let Err(e) = app.orchestrator.submit(&input, &mut tx, &cancel).await {
                log::debug!("Analysis ended with: {}", e);
            }
        }
    });

    let body = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        match rx.recv().await {
            Some(event) => {
                let frame = messages::AnalysisFrame::from(event);
                let line = match serde_json::to_string(&frame) {
                    Ok(line) => line + "\n",
                    Err(e) => {
                        log::error!("Failed to encode frame: {}", e);
                        String::new()
                    }
                };
                Some((Ok::<_, Infallible>(line), (rx, guard)))
            }
            None => None,
        }
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
        .into_response()
}

async fn get_state(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    Json(messages::StateResponse {
        state: app.orchestrator.state().as_str().to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: OculusArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let mut config = OculusConfig::default()
        .with_api_base(args.api_base)
        .with_model(args.model)
        .with_max_tokens(args.max_tokens);
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    // read once at startup; never written back to the environment
    let default_key = args
        .api_key
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|key| !key.trim().is_empty());
    if default_key.is_none() {
        log::warn!("No default API key configured, the form must provide one");
    }

    let provider = OpenAiProvider::new(&config)?;
    let app = Arc::new(AppState {
        orchestrator: AnalysisOrchestrator::new(provider, config),
        default_key,
    });

    let router = Router::new()
        .route("/", get(|| async { Html(INDEX_PAGE) }))
        .route("/analyze", post(post_analyze))
        .route("/state", get(get_state))
        .with_state(app);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
