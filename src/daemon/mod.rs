//! The host process the browser extension talks to. Three tasks run side by side:
//!  - the reader turns stdin lines into [protocol::Input]s;
//!  - [service::FocusService] handles inputs one at a time;
//!  - the writer serializes responses and host commands to stdout.

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use futures::StreamExt;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    browser::mirror::{HostCommand, MirroredBrowser},
    store::{file::JsonFileStore, repository::StateRepository},
    utils::{
        clock::{Clock, DefaultClock},
        dir::store_path,
    },
};

use alarm::{run_badge_ticker, AlarmBridge};
use args::ServeArgs;
use protocol::{Inbound, Input, Outbound};
use service::FocusService;

pub mod alarm;
pub mod args;
pub mod protocol;
pub mod service;
pub mod shutdown;

const INPUT_CAPACITY: usize = 32;

/// Represents the starting point for the host. Runs until stdin closes or the process is
/// interrupted.
pub async fn start_host(args: ServeArgs, dir: PathBuf) -> Result<()> {
    let store = Arc::new(JsonFileStore::new(store_path(&dir))?);
    let repository = StateRepository::new(store);
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);

    run_host(
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        repository,
        clock,
        args,
    )
    .await
}

async fn run_host(
    reader: impl AsyncBufRead + Unpin,
    writer: impl AsyncWrite + Unpin,
    repository: StateRepository,
    clock: Arc<dyn Clock>,
    args: ServeArgs,
) -> Result<()> {
    let shutdown_token = CancellationToken::new();
    let (input_sender, input_receiver) = mpsc::channel::<Input>(INPUT_CAPACITY);
    let (command_sender, command_receiver) = mpsc::unbounded_channel::<HostCommand>();
    let (response_sender, response_receiver) = mpsc::unbounded_channel::<Outbound>();

    let browser = Arc::new(MirroredBrowser::new(
        args.extension_origin.clone(),
        command_sender,
    ));
    let alarms = AlarmBridge::new(input_sender.clone(), clock.clone(), shutdown_token.clone());
    let service = FocusService::new(
        browser,
        repository,
        clock.clone(),
        alarms,
        args.orphaned_visits,
    );

    info!("Host started");
    let (_, read_result, service_result, write_result, _) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        read_inbound(reader, input_sender.clone(), shutdown_token.clone()),
        service.run(input_receiver, response_sender, shutdown_token.clone()),
        write_outbound(writer, command_receiver, response_receiver),
        run_badge_ticker(
            input_sender,
            clock,
            args.badge_interval,
            shutdown_token.clone()
        ),
    );

    if let Err(e) = read_result {
        error!("Reading from the browser failed {e:?}");
    }
    if let Err(e) = write_result {
        error!("Writing to the browser failed {e:?}");
    }
    service_result.inspect_err(|e| error!("Service loop got an error {e:?}"))?;
    info!("Host stopped");
    Ok(())
}

/// Forwards stdin frames to the service loop. Closing stdin means the browser went away, which
/// shuts the whole host down.
async fn read_inbound(
    reader: impl AsyncBufRead + Unpin,
    sender: mpsc::Sender<Input>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut lines = LinesStream::new(reader.lines());
    let result = loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            line = lines.next() => line,
        };
        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => break Err(e.into()),
            None => {
                debug!("Browser closed the input stream");
                break Ok(());
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(&line) {
            Ok(frame) => {
                if sender.send(frame.into()).await.is_err() {
                    break Ok(());
                }
            }
            Err(e) => warn!("Skipping malformed frame {e}"),
        }
    };
    shutdown.cancel();
    result
}

/// Writes host commands and responses, one frame per line. Commands queued while handling a
/// request go out before its response. Ends once both channels are closed.
async fn write_outbound(
    mut writer: impl AsyncWrite + Unpin,
    mut commands: mpsc::UnboundedReceiver<HostCommand>,
    mut responses: mpsc::UnboundedReceiver<Outbound>,
) -> Result<()> {
    loop {
        let frame = tokio::select! {
            biased;
            Some(command) = commands.recv() => Outbound::Command { body: command },
            Some(response) = responses.recv() => response,
            else => break,
        };
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
