//! installq - sequential download/install queue
//!
//! Drives an external installer for one title at a time, keeping the pending
//! queue and the finished history on disk between runs.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use installq::app;
use installq::backend::{BackendActor, BackendCommand};
use installq::queue::{
    ChannelNotifier, LogNotifier, QueueElement, QueueManager, TaskId, TaskKind, TaskParams,
};
use installq::utils::{self, InstallqError, QueueSettings, StoreBackend};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "installq", version, about)]
struct Args {
    /// Directory holding the queue store and settings.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Store backend
    #[arg(long, global = true, value_enum)]
    store: Option<StoreBackend>,

    /// Installer program run for every task
    #[arg(long, global = true)]
    installer: Option<String>,

    /// Extra argument passed to the installer before the task arguments
    #[arg(long = "installer-arg", global = true, allow_hyphen_values = true)]
    installer_args: Vec<String>,

    /// JSON library file used to enrich finished records
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a task and process the queue until it is empty
    Add {
        id: String,
        #[arg(long, value_enum, default_value_t = TaskKind::Install)]
        kind: TaskKind,
        #[arg(long)]
        runner: String,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        path: Option<PathBuf>,
        /// Extra executor parameter, as key=value (value parsed as JSON when possible)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Remove a pending task
    Remove { id: String },
    /// Show the pending queue and finished history
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget all finished tasks
    ClearHistory,
    /// Process a queue left over from an earlier run
    Resume,
    /// Read JSON-lines commands on stdin and write events to stdout
    Serve,
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let settings = load_settings(&args)?;

    match args.command {
        Command::Add {
            id,
            kind,
            runner,
            platform,
            path,
            params,
        } => {
            require_installer(&settings)?;
            let mut task = TaskParams::new(id.as_str(), runner);
            task.platform = platform;
            task.path = path;
            task.extra.extend(params);
            add(&settings, QueueElement::new(kind, task)).await
        }
        Command::Remove { id } => {
            let manager = app::build_manager(&settings, Arc::new(LogNotifier)).await?;
            manager.dequeue_by_id(&TaskId::new(id)).await
        }
        Command::Status { json } => status(&settings, json).await,
        Command::ClearHistory => {
            let manager = app::build_manager(&settings, Arc::new(LogNotifier)).await?;
            manager.clear_history().await
        }
        Command::Resume => {
            require_installer(&settings)?;
            let manager = app::build_manager(&settings, Arc::new(LogNotifier)).await?;
            if manager.resume().await? {
                manager.wait_idle().await;
            } else {
                println!("Queue is empty");
            }
            Ok(())
        }
        Command::Serve => {
            require_installer(&settings)?;
            serve(&settings).await
        }
    }
}

fn load_settings(args: &Args) -> Result<QueueSettings> {
    let data_dir = match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory {:?}", dir))?;
            dir.clone()
        }
        None => utils::get_data_dir(),
    };

    let mut settings = QueueSettings::load(&data_dir)?;
    if let Some(store) = args.store {
        settings.store = store;
    }
    if let Some(installer) = &args.installer {
        settings.installer = Some(installer.clone());
        settings.installer_args = args.installer_args.clone();
    } else if !args.installer_args.is_empty() {
        settings.installer_args = args.installer_args.clone();
    }
    if let Some(library) = &args.library {
        settings.library_file = Some(library.clone());
    }
    Ok(settings)
}

fn require_installer(settings: &QueueSettings) -> Result<()> {
    if settings.installer.is_none() {
        return Err(InstallqError::InstallerNotFound(
            "set --installer or \"installer\" in settings.json".to_string(),
        )
        .into());
    }
    Ok(())
}

async fn add(settings: &QueueSettings, element: QueueElement) -> Result<()> {
    let id = element.id().clone();
    let manager = app::build_manager(settings, Arc::new(LogNotifier)).await?;

    manager.enqueue(element).await?;
    manager.wait_idle().await;

    let snapshot = manager.snapshot().await?;
    match snapshot.finished.iter().find(|r| r.id() == &id) {
        Some(record) => {
            println!("{}: {}", id, record.status);
            if let Some(error) = &record.error {
                println!("  {}", error);
            }
        }
        None => bail!("{} did not finish", id),
    }
    Ok(())
}

async fn status(settings: &QueueSettings, json: bool) -> Result<()> {
    let manager = app::build_manager(settings, Arc::new(LogNotifier)).await?;
    let snapshot = manager.snapshot().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Queue ({}):", snapshot.queue.len());
    for (i, element) in snapshot.queue.iter().enumerate() {
        println!(
            "  {:>2}. {:<8} {} [{}] added {}",
            i + 1,
            element.kind,
            element.id(),
            element.params.runner,
            element.added_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("Finished ({}):", snapshot.finished.len());
    for record in &snapshot.finished {
        println!(
            "  {:<6} {:<8} {} [{}] at {}",
            record.status,
            record.element.kind,
            record.id(),
            record.element.params.runner,
            record.finished_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn serve(settings: &QueueSettings) -> Result<()> {
    let (notifier, queue_events) = ChannelNotifier::channel(256);
    let manager: QueueManager = app::build_manager(settings, Arc::new(notifier)).await?;

    let (cmd_tx, cmd_rx) = mpsc::channel::<BackendCommand>(32);
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let actor = BackendActor::new(manager, queue_events, cmd_rx, event_tx);
    let actor_handle = tokio::spawn(actor.run());

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if stdout.write_all(line.as_bytes()).await.is_err()
                        || stdout.write_all(b"\n").await.is_err()
                        || stdout.flush().await.is_err()
                    {
                        break;
                    }
                }
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
        }
    });

    info!("Reading commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown = false;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<BackendCommand>(&line) {
            Ok(cmd) => {
                shutdown = cmd == BackendCommand::Shutdown;
                if cmd_tx.send(cmd).await.is_err() || shutdown {
                    break;
                }
            }
            Err(e) => warn!("Ignoring malformed command {:?}: {}", line, e),
        }
    }

    if !shutdown {
        info!("stdin closed, waiting for queued tasks");
    }
    // the actor handles every buffered command, then waits for the queue to go
    // idle unless it was told to shut down
    drop(cmd_tx);
    actor_handle.await?;
    printer.await?;
    Ok(())
}
