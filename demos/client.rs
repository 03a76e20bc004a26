use argh::FromArgs;
use futures::StreamExt;
use kornia_oculus::{CURSOR_MARKER, ImageFormat};
use std::{io::Write, path::PathBuf};

mod messages;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Oculus client for analyzing images and checking the server state
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "analyze" or "state"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Analyze(AnalyzeCommand),
    State(StateCommand),
}

#[derive(FromArgs)]
/// Analyze an image and stream the description
#[argh(subcommand, name = "analyze")]
struct AnalyzeCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// optional context about the image
    #[argh(option, short = 'c')]
    context: Option<String>,

    /// API key, when the server has no default one
    #[argh(option, short = 'k')]
    api_key: Option<String>,
}

#[derive(FromArgs)]
/// Check the analysis state
#[argh(subcommand, name = "state")]
struct StateCommand {}

/// Redraws the streamed text in place, keeping the cursor marker at the end.
#[derive(Default)]
struct TerminalView {
    printed: usize,
    cursor_shown: bool,
}

impl TerminalView {
    fn frame(&mut self, text: &str, cursor: bool) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        if self.cursor_shown {
            write!(stdout, "\x08 \x08")?;
        }
        if let Some(delta) = text.get(self.printed..) {
            write!(stdout, "{}", delta)?;
        }
        self.printed = text.len();
        if cursor {
            write!(stdout, "{}", CURSOR_MARKER)?;
        }
        self.cursor_shown = cursor;
        stdout.flush()
    }

    fn clear_cursor(&mut self) -> std::io::Result<()> {
        if self.cursor_shown {
            self.cursor_shown = false;
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "\x08 \x08")?;
            stdout.flush()?;
        }
        Ok(())
    }
}

async fn analyze(
    client: &reqwest::Client,
    addr: &str,
    command: AnalyzeCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(&command.image_path)?;
    let file_name = command
        .image_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    let mime = ImageFormat::from_extension(&file_name)
        .or_else(|| ImageFormat::sniff(&bytes))
        .ok_or_else(|| format!("Unsupported image format: {}", file_name))?
        .mime();

    let mut form = reqwest::multipart::Form::new().part(
        "image",
        reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)?,
    );
    if let Some(context) = command.context {
        form = form.text("context_enabled", "true").text("context", context);
    }
    if let Some(api_key) = command.api_key {
        form = form.text("api_key", api_key);
    }

    let response = client
        .post(format!("http://{}/analyze", addr))
        .multipart(form)
        .send()
        .await?;

    if !response.status().is_success() {
        let result = response.json::<serde_json::Value>().await?;
        println!("Result: {}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let mut body = response.bytes_stream();
    let mut buffer = Vec::new();
    let mut view = TerminalView::default();

    loop {
        let chunk = tokio::select! {
            chunk = body.next() => chunk,
            _ = tokio::signal::ctrl_c() => {
                view.clear_cursor()?;
                eprintln!("\nCancelled");
                return Ok(());
            }
        };
        let Some(chunk) = chunk else {
            break;
        };
        buffer.extend_from_slice(&chunk?);

        while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=line_end).collect();
            let frame: messages::AnalysisFrame = serde_json::from_slice(&line)?;
            match frame {
                messages::AnalysisFrame::Frame { text, cursor } => view.frame(&text, cursor)?,
                messages::AnalysisFrame::Warning { message } => eprintln!("⚠️ {}", message),
                messages::AnalysisFrame::Failed { message } => {
                    view.clear_cursor()?;
                    eprintln!("\n❌ An error occurred: {}", message);
                }
                messages::AnalysisFrame::Completed { fragments, .. } => {
                    println!();
                    eprintln!("✅ Analysis completed ({} fragments)", fragments);
                }
                messages::AnalysisFrame::State { state } => log::debug!("state: {}", state),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Analyze(analyze_command) => {
            analyze(&client, &addr, analyze_command).await?;
        }
        ClientCommands::State(_) => {
            let response = client
                .get(format!("http://{}/state", addr))
                .send()
                .await?;

            let result = response.json::<messages::StateResponse>().await?;
            println!("State: {}", result.state);
        }
    }

    Ok(())
}
