use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use compile_session::config::Config;
use compile_session::learning_api::{LearningApi, LearningApiError};
use compile_session::structured_logger::StructuredLogger;
use compile_session::{logging, paths, CompileSession, OutputKind, SessionSnapshot};
use serde::Serialize;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("COMPILE_SESSION_GIT_SHA"),
    ")"
);

#[derive(Parser)]
#[command(name = "compile-session")]
#[command(about = "Run programs interactively on a remote execution service")]
#[command(version = VERSION)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Service base URL (overrides config and COMPILE_SESSION_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a source file interactively, relaying stdin
    Run {
        /// Language (inferred from the file extension when omitted)
        #[arg(short, long)]
        language: Option<String>,
        /// Print the run summary as JSON when done
        #[arg(long)]
        json: bool,
        file: PathBuf,
    },
    /// Compile and run a source file in one request, without streaming
    Compile {
        #[arg(short, long)]
        language: Option<String>,
        file: PathBuf,
    },
    /// Show a user's learning progress
    Progress { user: String },
    /// List the concepts a user can learn next
    Frontier { user: String },
    /// Fetch (or generate) the lesson for a concept
    Lesson {
        concept: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Print the knowledge graph as Mermaid
    Visualize { user: Option<String> },
    /// Check whether the service is reachable
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run_cli(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[compile-session] Error: {:#}", e);
            1
        }
    };
    let _ = std::io::stdout().flush();
    // Exit directly: a pending stdin read would otherwise hold the runtime open.
    std::process::exit(code);
}

async fn run_cli(cli: Cli) -> Result<i32> {
    let mut config = Config::resolve().context("Failed to load configuration")?;
    if let Some(server) = cli.server {
        config.server_url = server;
        config.validate()?;
    }

    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("[compile-session] Warning: {:#}", e);
    }

    match cli.command {
        Command::Run {
            language,
            json,
            file,
        } => run_session(&config, language, &file, json).await,
        Command::Compile { language, file } => {
            let (language, code) = read_source(&config, language, &file)?;
            let output = with_api(&config, move |api| api.compile(&language, &code)).await?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            if let Some(run) = &output.run_output {
                print!("{}", run.stdout);
                eprint!("{}", run.stderr);
            }
            Ok(if output.success {
                output.exit_code.unwrap_or(0)
            } else {
                output.exit_code.filter(|c| *c != 0).unwrap_or(1)
            })
        }
        Command::Progress { user } => {
            print_json(&with_api(&config, move |api| api.progress(&user)).await?)
        }
        Command::Frontier { user } => {
            print_json(&with_api(&config, move |api| api.frontier(&user)).await?)
        }
        Command::Lesson { concept, model } => print_json(
            &with_api(&config, move |api| api.lesson(&concept, model.as_deref())).await?,
        ),
        Command::Visualize { user } => {
            let diagram =
                with_api(&config, move |api| api.visualization(user.as_deref())).await?;
            println!("{}", diagram.trim_end());
            Ok(0)
        }
        Command::Check => {
            let url = config.server_url.clone();
            let available = with_api(&config, |api| Ok(api.is_backend_available())).await?;
            if available {
                println!("Service at {} is reachable", url);
                Ok(0)
            } else {
                println!("Service at {} is not reachable", url);
                Ok(1)
            }
        }
    }
}

/// Streams one run to the terminal and returns the process exit code.
async fn run_session(
    config: &Config,
    language: Option<String>,
    file: &Path,
    json: bool,
) -> Result<i32> {
    let (language, code) = read_source(config, language, file)?;
    let session = CompileSession::spawn(&config.server_url, open_event_log(config));
    let run = session.start(language, code);

    let echo_input = !std::io::stdin().is_terminal();
    let mut snapshots = session.subscribe();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut printed = 0;

    let last = loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break session.snapshot();
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.run != run {
                    continue;
                }
                printed = print_output(&snapshot, printed, echo_input)?;
                if snapshot.is_terminal() {
                    break snapshot;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => session.send_input(format!("{}\n", line)),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n[compile-session] Killing run");
                session.kill();
            }
        }
    };

    if json {
        if let Some(summary) = last.summary() {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(last.exit_code().unwrap_or(1))
}

/// Writes output events after the first `printed` and returns the new count.
fn print_output(snapshot: &SessionSnapshot, printed: usize, echo_input: bool) -> Result<usize> {
    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();
    for event in snapshot.output.events_from(printed) {
        match event.kind {
            OutputKind::Stdout => stdout.write_all(event.data.as_bytes())?,
            OutputKind::StdinEcho if echo_input => stdout.write_all(event.data.as_bytes())?,
            OutputKind::StdinEcho => {}
            OutputKind::Stderr | OutputKind::SystemError => {
                stderr.write_all(event.data.as_bytes())?
            }
        }
    }
    stdout.flush()?;
    stderr.flush()?;
    Ok(snapshot.output.len())
}

fn open_event_log(config: &Config) -> Arc<StructuredLogger> {
    let session_id = uuid::Uuid::new_v4().to_string();
    if !config.event_log {
        return Arc::new(StructuredLogger::disabled(&session_id));
    }
    let logger = paths::logs_dir().and_then(|dir| StructuredLogger::new(&session_id, &dir));
    match logger {
        Ok(logger) => {
            if let Some(path) = logger.path() {
                tracing::debug!(path = %path.display(), "event log opened");
            }
            Arc::new(logger)
        }
        Err(e) => {
            tracing::warn!(error = %e, "event log unavailable");
            Arc::new(StructuredLogger::disabled(&session_id))
        }
    }
}

fn read_source(config: &Config, language: Option<String>, file: &Path) -> Result<(String, String)> {
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file: {}", file.display()))?;
    let language = language
        .or_else(|| infer_language(file).map(str::to_string))
        .unwrap_or_else(|| config.default_language.clone());
    Ok((language, code))
}

fn infer_language(file: &Path) -> Option<&'static str> {
    let extension = file.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" | "mjs" => Some("javascript"),
        "go" => Some("go"),
        "c" => Some("c"),
        "cpp" | "cc" | "cxx" => Some("cpp"),
        _ => None,
    }
}

/// Runs a blocking REST call off the async runtime.
async fn with_api<T, F>(config: &Config, call: F) -> Result<T>
where
    F: FnOnce(&LearningApi) -> Result<T, LearningApiError> + Send + 'static,
    T: Send + 'static,
{
    let api = LearningApi::new(&config.server_url, config.request_timeout())?;
    let result = tokio::task::spawn_blocking(move || call(&api))
        .await
        .context("REST worker failed")?;
    Ok(result?)
}

fn print_json(value: &impl Serialize) -> Result<i32> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(0)
}
