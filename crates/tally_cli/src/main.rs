use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_core::config::StorageConfig;
use tally_core::{KvStore, MemoryKvStore, TallyConfig, TodoStore};
use tally_memory::SqliteKvStore;
use tally_reasoning::providers::create_client;
use tally_reasoning::{
    register_todo_tools, ChatSession, SessionError, SessionOptions, ToolRegistry, TurnOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

use commands::Command;
use render::Renderer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the todo database (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Model to use (overrides config)
    #[arg(short, long)]
    model: Option<String>,

    /// Generation provider: `ollama` or `mock` (overrides config)
    #[arg(long)]
    provider: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_file.as_deref())?;

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    info!("Loading config from {}", config_path.display());
    let mut config = TallyConfig::load_or_default(&config_path);
    if let Some(db) = args.db {
        config.storage.db_path = db;
    }
    if let Some(model) = args.model {
        config.llm.model = model;
    }
    if let Some(provider) = args.provider {
        config.llm.provider = provider;
    }

    let todos = Arc::new(open_todos(&config.storage).await);
    let mut registry = ToolRegistry::new();
    register_todo_tools(&mut registry, todos.clone());
    let options = SessionOptions::from_config(&config, &registry)?;

    let client = create_client(&config.llm)?;
    match client.health_check().await {
        Ok(()) => println!("Tally ready ({} via {}).", config.llm.model, config.llm.provider),
        Err(e) => {
            warn!("Health check failed: {:#}", e);
            println!(
                "[warning] The model server is not reachable: {:#}\n\
                 Start it, or run with --provider mock.",
                e
            );
        }
    }
    let session = Arc::new(ChatSession::new(client, Arc::new(registry), options));

    println!("Type a request, or /help for commands.");
    prompt_marker()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match commands::parse(&line) {
                    Command::Quit => break,
                    Command::Empty => {}
                    Command::Prompt(text) => {
                        if session.is_running().await {
                            println!("Still answering. /reset to stop it.");
                        } else {
                            tokio::spawn(run_turn(session.clone(), text));
                            continue;
                        }
                    }
                    Command::Reset => session.reset().await,
                    Command::Add(title) => {
                        let todo = todos.add(&title).await;
                        println!("Added #{} {}", todo.id, todo.title);
                    }
                    Command::Toggle(id) => {
                        if todos.set_completed(&[id], None).await == 0 {
                            println!("No todo #{}", id);
                        }
                        print_todos(&todos).await;
                    }
                    Command::Remove(id) => {
                        if todos.remove(&[id]).await == 0 {
                            println!("No todo #{}", id);
                        }
                        print_todos(&todos).await;
                    }
                    Command::List => print_todos(&todos).await,
                    Command::Help => println!("{}", commands::HELP),
                    Command::Invalid(msg) => println!("{}", msg),
                }
                prompt_marker()?;
            }
            _ = tokio::signal::ctrl_c() => {
                if session.is_running().await {
                    session.reset().await;
                } else {
                    break;
                }
            }
        }
    }

    if todos.is_degraded() {
        println!("[warning] Changes this session could not be saved.");
    }
    info!("Bye");
    Ok(())
}

/// Drive one prompt, rendering the reply as it streams.
async fn run_turn(session: Arc<ChatSession>, prompt: String) {
    let mut rx = session.subscribe();
    let _ = rx.borrow_and_update();
    let mut renderer = Renderer::default();

    let turn = session.submit(&prompt);
    tokio::pin!(turn);
    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            Ok(()) = rx.changed() => {
                let next = rx.borrow_and_update().clone();
                write_frame(&mut renderer, &next);
            }
        }
    };
    let last = rx.borrow().clone();
    write_frame(&mut renderer, &last);

    match outcome {
        Ok(TurnOutcome::Completed { tool_rounds, .. }) => {
            info!("Turn completed after {} tool round(s)", tool_rounds);
            println!();
        }
        Ok(TurnOutcome::Cancelled) => println!("\n[stopped]"),
        Err(SessionError::Busy) => println!("Still answering. /reset to stop it."),
        Err(e) => {
            warn!("Turn failed: {}", e);
            if renderer.has_output() {
                println!();
            }
            println!("[error] {}", e);
        }
    }
    let _ = prompt_marker();
}

fn write_frame(renderer: &mut Renderer, next: &str) {
    if let Some(out) = renderer.update(next) {
        print!("{}", out);
        let _ = std::io::stdout().flush();
    }
}

fn prompt_marker() -> std::io::Result<()> {
    print!("> ");
    std::io::stdout().flush()
}

async fn print_todos(todos: &TodoStore) {
    let list = todos.list().await;
    if list.is_empty() {
        println!("(no todos)");
    }
    for todo in list {
        let mark = if todo.completed { "x" } else { " " };
        println!("[{}] #{} {}", mark, todo.id, todo.title);
    }
}

/// SQLite at the configured path, or an in-memory store when it cannot be opened.
async fn open_todos(config: &StorageConfig) -> TodoStore {
    let storage: Arc<dyn KvStore> = match SqliteKvStore::new(&config.db_path).await {
        Ok(store) => {
            info!("Todo database at {}", config.db_path.display());
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "Could not open {} ({:#}), todos will not be saved",
                config.db_path.display(),
                e
            );
            Arc::new(MemoryKvStore::new())
        }
    };
    TodoStore::load(storage, &config.todos_key).await
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("tally").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("tally.toml"))
}

/// Logs go to stderr at `warn` so they do not interleave with the chat, or to
/// `--log-file` at `info`. `RUST_LOG` overrides either default.
fn init_tracing(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_level = if log_file.is_some() { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("--log-file must name a file: {}", path.display()))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}
