pub mod sessions;
pub mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sessions::{process_sessions_command, SessionsCommand};
use status::{process_status_command, StatusCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{args::ServeArgs, start_host},
    store::{file::JsonFileStore, repository::StateRepository},
    utils::{
        dir::{create_application_default_path, store_path},
        logging::{enable_logging, CLI_PREFIX, HOST_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Focuswarden", version, long_about = None)]
#[command(
    about = "Focus timer that blocks distracting sites and tracks where time goes",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run the host the browser extension talks to. Speaks JSON lines over stdin and stdout"
    )]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },
    #[command(about = "Show the current timer, the suggested next session and the streak")]
    Status {
        #[command(flatten)]
        command: StatusCommand,
    },
    #[command(about = "List the latest sessions")]
    Sessions {
        #[command(flatten)]
        command: SessionsCommand,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct DirArgs {
    #[arg(
        long,
        help = "Application directory. By default uses $XDG_STATE_HOME/focuswarden or $HOME/.local/state/focuswarden"
    )]
    pub dir: Option<PathBuf>,
}

impl DirArgs {
    pub fn resolve(&self) -> Result<PathBuf> {
        resolve_dir(self.dir.clone())
    }
}

fn resolve_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => create_application_default_path(),
    }
}

/// Read-only access to the store the host writes.
pub fn open_repository(dir: &std::path::Path) -> Result<StateRepository> {
    let store = JsonFileStore::new(store_path(dir))?;
    Ok(StateRepository::new(std::sync::Arc::new(store)))
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    match args.commands {
        Commands::Serve { args: serve } => {
            let dir = resolve_dir(serve.dir.clone())?;
            enable_logging(HOST_PREFIX, &dir, serve.log, serve.log_console)?;
            start_host(serve, dir).await
        }
        Commands::Status { command } => {
            init_cli_logging(&command.dir, args.log)?;
            process_status_command(command).await
        }
        Commands::Sessions { command } => {
            init_cli_logging(&command.dir, args.log)?;
            process_sessions_command(command).await
        }
    }
}

fn init_cli_logging(dir: &DirArgs, log: bool) -> Result<()> {
    let logging_level = if log { Some(LevelFilter::TRACE) } else { None };
    enable_logging(CLI_PREFIX, &dir.resolve()?, logging_level, log)
}
