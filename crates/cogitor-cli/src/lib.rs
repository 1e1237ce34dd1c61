//! Cogitor command line client: interactive loop, batch mode, and the
//! `--server`/`--gui` web surface.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::warn;

use cogitor_engine::{
    Config, EngineError, OperatorPrompt, QueryOutcome, Session,
};
use cogitor_gateway::dispatch_command;
use cogitor_runtime::ProviderKind;

pub const DEFAULT_PROVIDER: &str = "ollama";
pub const DEFAULT_MODEL: &str = "gemma3:4b";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "cogitor",
    version,
    about = "Interactive coding copilot",
    long_about = "Interactive coding copilot: turns free-text requests into verified, \
                  on-disk changes via an LLM backend, a fuzzy patch engine, and a \
                  sandboxed build loop"
)]
pub struct Cli {
    #[arg(help = "LLM provider (ollama, openrouter, pollinations, phind, or a URL)",
          default_value = DEFAULT_PROVIDER)]
    pub provider: String,

    #[arg(help = "Model name", default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(help = "API key, when the provider needs one")]
    pub api_key: Option<String>,

    #[arg(
        long,
        value_name = "PORT",
        num_args = 0..=1,
        default_missing_value = "8080",
        help = "Run the web server (default port 8080)"
    )]
    pub server: Option<u16>,

    #[arg(long, help = "Run the web server and open it in the browser")]
    pub gui: bool,

    #[arg(
        short = 'i',
        long = "input",
        value_name = "FILE",
        help = "Batch mode: read queries line by line from a file"
    )]
    pub input: Option<PathBuf>,

    #[arg(
        long = "no-search",
        alias = "disable-search",
        help = "Disable web search"
    )]
    pub no_search: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let kind = ProviderKind::parse(&cli.provider)
        .ok_or_else(|| CliError::UnsupportedProvider(cli.provider.clone()))?;

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "could not load config, using defaults");
            Config::default()
        }
    };
    if cli.no_search {
        config.web_search = false;
    }

    let session = Session::new(kind, cli.model.clone(), cli.api_key.clone(), config)?;

    if cli.server.is_some() || cli.gui {
        let port = cli.server.unwrap_or(DEFAULT_SERVER_PORT);
        return serve(session, port, cli.gui).await;
    }

    if let Some(input) = &cli.input {
        return run_batch(&session, input).await;
    }

    run_interactive(&session).await
}

async fn serve(session: Arc<Session>, port: u16, open_browser: bool) -> Result<(), CliError> {
    let app = cogitor_gateway::build_routes(session);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CliError::Server(format!("cannot bind {addr}: {e}")))?;
    println!("cogitor web interface on http://localhost:{port}");

    if open_browser {
        if let Err(err) = cogitor_engine::sys::open_url_in_browser(&format!(
            "http://localhost:{port}"
        )) {
            warn!(error = %err, "could not open the browser");
        }
    }

    axum::serve(listener, app)
        .await
        .map_err(|e| CliError::Server(e.to_string()))
}

/// Batch mode: every non-empty, non-comment line is one query, processed
/// with auto mode on.
async fn run_batch(session: &Arc<Session>, input: &PathBuf) -> Result<(), CliError> {
    let text = tokio::fs::read_to_string(input).await?;
    for line in text.lines() {
        let query = line.trim();
        if query.is_empty() || query.starts_with('#') {
            continue;
        }
        println!("> {query}");
        match session.process_query(query, true, &NonInteractive).await {
            Ok(outcome) => render_outcome(session, &outcome).await,
            Err(EngineError::CancelledByUser) => println!("request cancelled by user"),
            Err(err) => eprintln!("error: {err}"),
        }
    }
    Ok(())
}

async fn run_interactive(session: &Arc<Session>) -> Result<(), CliError> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let triple = session.provider_triple();
    println!(
        "cogitor v{} | provider: {} | model: {}",
        env!("CARGO_PKG_VERSION"),
        triple.kind.name(),
        triple.model
    );
    println!("type 'quit', 'exit' or 'bye' to leave; :help lists commands");
    println!(
        "references: @file[:N[-M]], @all, @http(s)://… | markers: $cod, $diff, $patch, $int"
    );
    println!("Ctrl-C cancels the running request, Ctrl-D ends the session");

    // Signal watcher: Ctrl-C trips the active scope, never exits the loop.
    let watcher = {
        let session = Arc::clone(session);
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                if session.cancel_active_request() {
                    eprintln!("\ncancelling the current request (Ctrl-C)…");
                } else {
                    eprintln!("\nno active request to cancel");
                }
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!("\nbye!");
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "quit" | "exit" | "bye") {
            println!("bye!");
            break;
        }

        let query = expand_clipboard_markers(query);
        match session.process_query(&query, false, &StdinPrompt).await {
            Ok(outcome) => render_outcome(session, &outcome).await,
            Err(EngineError::CancelledByUser) => println!("request cancelled by user"),
            Err(err) => eprintln!("error: {err}"),
        }
    }

    watcher.abort();
    Ok(())
}

/// Splice clipboard contents into the query: `$clip` is replaced inline,
/// `$clip+` appends the clipboard after the query text.
fn expand_clipboard_markers(query: &str) -> String {
    if !query.contains("$clip") {
        return query.to_string();
    }
    let clipboard = match cogitor_engine::sys::read_clipboard() {
        Ok(text) => text.trim().to_string(),
        Err(err) => {
            eprintln!("clipboard unavailable: {err}");
            String::new()
        }
    };
    if query.contains("$clip+") {
        let stripped = query.replace("$clip+", "");
        format!("{}\n\n{clipboard}", stripped.trim())
    } else {
        query.replace("$clip", &clipboard)
    }
}

async fn render_outcome(session: &Arc<Session>, outcome: &QueryOutcome) {
    match outcome {
        QueryOutcome::Command { raw } => match dispatch_command(session, raw).await {
            Ok(output) => println!("{output}"),
            Err(err) => eprintln!("error: {err}"),
        },
        QueryOutcome::Prose { text } => println!("\n{text}"),
        QueryOutcome::CodeGeneration(report) => {
            for path in &report.written {
                println!("file written: {path}");
            }
            for issue in &report.skipped {
                eprintln!("skipped {}: {}", issue.path, issue.error);
            }
            for command in &report.pending_installs {
                println!("install manually: {command}");
            }
            if let Some(output) = &report.run_output {
                if !output.is_empty() {
                    println!("output:\n{output}");
                }
            }
            if let Some(error) = &report.run_error {
                eprintln!("run failed: {error}");
            }
            println!("generation done: {} files written", report.written.len());
        }
        QueryOutcome::DiffApplied(report) => {
            for file in &report.files {
                let warnings = if file.warnings.is_empty() {
                    String::new()
                } else {
                    format!(", {} warnings", file.warnings.len())
                };
                println!(
                    "{}: applied {}/{} patches{warnings}",
                    file.path, file.applied, file.total
                );
            }
            for failure in &report.failures {
                eprintln!("{}: {}", failure.path, failure.error);
            }
            for check in &report.check_errors {
                eprintln!("{} still has errors: {}", check.path, check.error);
            }
        }
        QueryOutcome::UrlOpened { url } => println!("opened {url}"),
        QueryOutcome::Declined { reason } => println!("cancelled: {reason}"),
    }
}

/// Interactive y/n and free-text prompts on stdin.
struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn confirm(&self, question: &str) -> bool {
        print!("{question} ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }

    fn input(&self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok()?;
        let trimmed = line.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Batch mode never asks; guarded actions proceed with defaults.
struct NonInteractive;

impl OperatorPrompt for NonInteractive {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
    fn input(&self, _prompt: &str) -> Option<String> {
        None
    }
}
