use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::utils::clock::Clock;

use super::protocol::Input;

pub const DEFAULT_BADGE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    /// The nominal duration of the session with this id has passed.
    SessionEnd(Uuid),
    BadgeRefresh,
}

/// Timers that feed [Alarm]s back into the service loop. At most one session alarm is pending.
pub struct AlarmBridge {
    sender: mpsc::Sender<Input>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    pending: Option<CancellationToken>,
}

impl AlarmBridge {
    pub fn new(
        sender: mpsc::Sender<Input>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sender,
            clock,
            shutdown,
            pending: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Replaces any pending session alarm.
    pub fn arm(&mut self, session_id: Uuid, after: Duration) {
        self.cancel();
        let token = self.shutdown.child_token();
        let sender = self.sender.clone();
        let clock = self.clock.clone();
        let cancelled = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Alarm for session {session_id} cancelled");
                }
                _ = clock.sleep(after) => {
                    info!("Alarm for session {session_id} fired");
                    if sender.send(Input::Alarm(Alarm::SessionEnd(session_id))).await.is_err() {
                        debug!("Service loop is gone, dropping alarm");
                    }
                }
            }
        });
        debug!("Armed alarm for session {session_id} in {after:?}");
        self.pending = Some(token);
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

/// Asks the service loop to refresh the badge every `period` until shutdown.
pub async fn run_badge_ticker(
    sender: mpsc::Sender<Input>,
    clock: Arc<dyn Clock>,
    period: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = clock.sleep(period) => {
                if sender.send(Input::Alarm(Alarm::BadgeRefresh)).await.is_err() {
                    return;
                }
            }
        }
    }
}
