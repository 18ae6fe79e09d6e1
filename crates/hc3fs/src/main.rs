//! hc3fs command-line host.
//!
//! Starts a session against the configured hub and runs one filesystem verb,
//! or stays up in `watch` mode printing console output and tree changes.
//!
//! ```bash
//! hc3fs ls /QuickApps
//! hc3fs cat /QuickApps/12_Lamp/main.lua
//! hc3fs put /QuickApps/12_Lamp/utils.lua ./utils.lua --create
//! hc3fs mv /QuickApps/12_Lamp/utils.lua /QuickApps/12_Lamp/helpers.lua
//! hc3fs watch --tag QUICKAPP12
//! ```
//!
//! Credentials come from `~/.config/hc3fs/config.toml` (or `--config`) and
//! the `HC3_URL`, `HC3_USER` and `HC3_PASSWORD` environment variables.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hc3fs_client::HubClient;
use hc3fs_kernel::{
    FileSystemProvider, FileType, Hc3Config, HubApi, RenameOptions, Session, WriteOptions,
};

/// Browse and edit a hub's QuickApps and scenes as files.
#[derive(Parser, Debug)]
#[command(name = "hc3fs", version)]
struct Args {
    /// Config file (default: ~/.config/hc3fs/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the shadow directory path here once the session is up
    #[arg(long, global = true)]
    path_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file
    Cat { path: String },
    /// Write a file from a local file or stdin
    Put {
        path: String,
        /// Local source (default: stdin)
        source: Option<PathBuf>,
        /// Create the file if it does not exist
        #[arg(long)]
        create: bool,
    },
    /// Delete a QuickApp script
    Rm { path: String },
    /// Rename a QuickApp script within its QuickApp
    Mv {
        from: String,
        to: String,
        /// Replace an existing target
        #[arg(short, long)]
        force: bool,
    },
    /// Show attributes and decoration of a path
    Stat { path: String },
    /// Download a QuickApp (.fqa) or scene as JSON
    Export {
        path: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show hub information
    Info,
    /// Run the pollers and print console lines and tree changes until Ctrl-C
    Watch {
        /// Console tags to show (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Do not poll the debug console
        #[arg(long)]
        no_console: bool,
    },
}

impl Command {
    fn write_options(create: bool) -> WriteOptions {
        if create {
            WriteOptions::upsert()
        } else {
            WriteOptions::update()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hc3fs: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Hc3Config> {
    let mut config = Hc3Config::load(args.config.as_deref())?.with_env();
    if let Some(path_file) = &args.path_file {
        config = config.with_path_file(path_file);
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let hub: Arc<dyn HubApi> =
        Arc::new(HubClient::new(&config.hub).context("failed to set up hub client")?);

    let mut session = Session::new(config, hub.clone())?;
    session.initialise().await?;

    let result = dispatch(&mut session, hub, args.command).await;
    session.shutdown().await;
    result
}

async fn dispatch(session: &mut Session, hub: Arc<dyn HubApi>, command: Command) -> Result<()> {
    let fs = session.fs().clone();
    match command {
        Command::Ls { path } => {
            for entry in fs.read_directory(&path).await? {
                match entry.kind {
                    FileType::Directory => println!("{}/", entry.name),
                    FileType::File => println!("{}", entry.name),
                }
            }
        }
        Command::Cat { path } => {
            let data = fs.read_file(&path).await?;
            tokio::io::stdout().write_all(&data).await?;
        }
        Command::Put {
            path,
            source,
            create,
        } => {
            let data = match source {
                Some(file) => tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("failed to read {}", file.display()))?,
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };
            fs.write_file(&path, &data, Command::write_options(create))
                .await?;
        }
        Command::Rm { path } => fs.delete(&path).await?,
        Command::Mv { from, to, force } => {
            fs.rename(&from, &to, RenameOptions { overwrite: force })
                .await?
        }
        Command::Stat { path } => {
            let attr = fs.stat(&path).await?;
            let mtime: chrono::DateTime<chrono::Local> = attr.mtime.into();
            println!("type:     {:?}", attr.kind);
            println!("size:     {}", attr.size);
            println!("readonly: {}", attr.readonly);
            println!("mtime:    {}", mtime.format("%Y-%m-%d %H:%M:%S"));
            if let Some(decoration) = fs.decorate(&path) {
                if let Some(badge) = decoration.badge {
                    println!("badge:    {badge}");
                }
                if let Some(tooltip) = decoration.tooltip {
                    for line in tooltip.lines() {
                        println!("          {line}");
                    }
                }
            }
        }
        Command::Export { path, output } => {
            let value = fs.export(&path).await?;
            let text = serde_json::to_string_pretty(&value)?;
            match output {
                Some(file) => {
                    tokio::fs::write(&file, text)
                        .await
                        .with_context(|| format!("failed to write {}", file.display()))?;
                    tracing::info!(path = %file.display(), "exported");
                }
                None => println!("{text}"),
            }
        }
        Command::Info => {
            let info = hub.get_server_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            println!("shadow: {}", session.shadow_root().display());
        }
        Command::Watch { tags, no_console } => watch(session, tags, no_console).await?,
    }
    Ok(())
}

async fn watch(session: &mut Session, tags: Vec<String>, no_console: bool) -> Result<()> {
    let poller = session.log_poller().clone();
    if !tags.is_empty() {
        poller.enable_tags(tags);
    }
    if no_console && poller.is_enabled() {
        poller.toggle();
    }

    let mut changes = session.fs().subscribe();
    let mut console = session
        .take_console()
        .context("console channel already taken")?;
    session.start_pollers();
    tracing::info!(shadow = %session.shadow_root().display(), "watching, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(line) = console.recv() => {
                println!("{} [{}] {}: {}", line.local_time(), line.level, line.tag, line.message);
            }
            batch = changes.recv() => match batch {
                Ok(batch) => {
                    for event in batch {
                        println!("{:?} {}", event.kind, event.path);
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "change stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
