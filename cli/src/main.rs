use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use boardflow::runtime::{BatchReport, RuntimeConfig, RuntimeError, spawn_board_runtime};
use boardflow::{Board, BoardError, BoardEvent, ConfigError, TransformRegistry, load_board};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing board definition; pass --board or set BOARD_DEFINITION")]
    MissingBoard,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid event on line {line}: {source}")]
    Event {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state codec failed: {0}")]
    Codec(#[from] datastate::CodecError),
    #[error("runtime task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Parser, Debug)]
#[command(name = "boardflow", about = "Build a dashboard board from YAML and drive it")]
struct Cli {
    /// Board definition file.
    #[arg(long, env = "BOARD_DEFINITION", global = true)]
    board: Option<PathBuf>,

    /// Navigation context to open first.
    #[arg(long, global = true)]
    context: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the active context: sidebar, layout, captions and panel outputs.
    Render,
    /// Print the shared control state.
    State(StateArgs),
    /// Feed JSONL events through the runtime and print one report per batch.
    Replay(ReplayArgs),
    /// List the built-in control kinds.
    Kinds,
}

#[derive(Args, Debug)]
struct StateArgs {
    #[arg(long, value_enum, default_value_t = StateFormat::Json)]
    format: StateFormat,

    /// Write protobuf bytes here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum StateFormat {
    Json,
    Proto,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// JSONL event file, `-` for stdin.
    #[arg(long, default_value = "-")]
    events: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
    if let Err(error) = dotenvy::dotenv() {
        debug!(%error, "no .env file loaded");
    }

    let cli = Cli::parse();
    match cli.command {
        Command::Kinds => run_kinds(),
        Command::Render => run_render(&open_board(cli.board.as_deref(), cli.context.as_deref())?),
        Command::State(args) => run_state(&open_board(cli.board.as_deref(), cli.context.as_deref())?, args),
        Command::Replay(args) => run_replay(open_board(cli.board.as_deref(), cli.context.as_deref())?, args).await,
    }
}

fn open_board(path: Option<&Path>, context: Option<&str>) -> Result<Board, CliError> {
    let path = path.ok_or(CliError::MissingBoard)?;
    let mut board = load_board(path)?;
    if let Some(context) = context {
        board.handle(BoardEvent::Navigate(context.to_owned()))?;
    }
    Ok(board)
}

fn run_kinds() -> Result<(), CliError> {
    for tag in TransformRegistry::with_builtins().kind_tags() {
        println!("{tag}");
    }
    Ok(())
}

fn run_render(board: &Board) -> Result<(), CliError> {
    let (sidebar_header, controls) = board.sidebar();
    let controls: Vec<Value> = controls
        .iter()
        .map(|c| json!({"id": c.id(), "header": c.header(), "kind": c.kind_tag(), "value": c.value()}))
        .collect();
    let layout = serde_json::to_value(board.layout())?;
    let panels = serde_json::to_value(board.render_active())?;
    print_json(&json!({
        "context": board.active_context(),
        "header": board.header(),
        "sidebar": {"header": sidebar_header, "controls": controls},
        "layout": layout,
        "captions": board.captions(),
        "panels": panels,
    }))
}

fn run_state(board: &Board, args: StateArgs) -> Result<(), CliError> {
    let state = board.state();
    match args.format {
        StateFormat::Json => print_json(&datastate::to_json(&state)?),
        StateFormat::Proto => {
            let bytes = datastate::encode_state(&state);
            match args.out {
                Some(path) => fs::write(&path, &bytes).map_err(|source| CliError::Io {
                    action: "write",
                    path: path.display().to_string(),
                    source,
                }),
                None => io::stdout().write_all(&bytes).map_err(|source| CliError::Io {
                    action: "write",
                    path: "stdout".to_owned(),
                    source,
                }),
            }
        }
    }
}

async fn run_replay(board: Board, args: ReplayArgs) -> Result<(), CliError> {
    let events = read_events(&args.events)?;
    let total = events.len();

    let (handle, task) = spawn_board_runtime(board, RuntimeConfig::from_env());
    let mut reports = handle.subscribe();
    let printer = tokio::spawn(async move {
        let mut batches = 0_usize;
        loop {
            match reports.recv().await {
                Ok(report) => {
                    print_report(&report)?;
                    batches = batches.saturating_add(1);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "report stream lagged"),
                Err(RecvError::Closed) => break,
            }
        }
        Ok::<usize, CliError>(batches)
    });

    for event in events {
        handle.send(event).await?;
    }
    drop(handle);

    let board = task.await?;
    let batches = printer.await??;
    eprintln!("replay complete: events={total} batches={batches} context={}", board.active_context());
    print_json(&datastate::to_json(&board.state())?)
}

fn read_events(input: &str) -> Result<Vec<BoardEvent>, CliError> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(input).map_err(|source| CliError::Io {
            action: "open",
            path: input.to_owned(),
            source,
        })?;
        Box::new(BufReader::new(file))
    };

    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CliError::Io {
            action: "read",
            path: input.to_owned(),
            source,
        })?;
        if let Some(event) = parse_event_line(&line, index + 1)? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Blank lines and `#` comments are skipped.
fn parse_event_line(line: &str, number: usize) -> Result<Option<BoardEvent>, CliError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| CliError::Event { line: number, source })
}

fn print_report(report: &BatchReport) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(report)?);
    Ok(())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
