use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    store::{
        entities::{Session, SessionStatus, SessionType, TimerState, TimerStatus},
        repository::StateRepository,
    },
    utils::clock::Clock,
};

use super::{nominal_duration, streak::compute_streak, LONG_BREAK_AFTER};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub timer_state: TimerState,
    pub session: Session,
}

/// Sole writer of [TimerState] and of the session ledger. Every operation re-reads the
/// persisted state first, nothing is cached between calls.
pub struct TimerStateMachine {
    repository: StateRepository,
    clock: Arc<dyn Clock>,
}

impl TimerStateMachine {
    pub fn new(repository: StateRepository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn state(&self) -> Result<TimerState> {
        self.repository.timer_state().await
    }

    /// Starts a session of `session_type`. A session that is still running is completed first.
    pub async fn start_session(&self, session_type: SessionType) -> Result<StartedSession> {
        if self.state().await?.is_running() {
            debug!("Completing running session before starting {session_type:?}");
            self.stop_session().await?;
        }

        let current = self.state().await?;
        let now = self.clock.time();
        let session = Session {
            id: Uuid::new_v4(),
            session_type,
            started_at: now,
            ended_at: None,
            status: SessionStatus::Running,
            cycle_position: current.cycle_position,
        };

        let mut sessions = self.repository.sessions().await?;
        sessions.push(session.clone());
        self.repository.save_sessions(&sessions).await?;

        let timer_state = TimerState {
            status: TimerStatus::Running,
            session_type: Some(session_type),
            started_at: Some(now),
            duration: Some(nominal_duration(session_type)),
            cycle_position: current.cycle_position,
            session_id: Some(session.id),
            alarm_fired: false,
        };
        self.repository.save_timer_state(&timer_state).await?;

        info!(
            "Started {session_type:?} session {} at cycle position {}",
            session.id, timer_state.cycle_position
        );
        Ok(StartedSession {
            timer_state,
            session,
        })
    }

    /// Completes the running session and returns the timer to idle. Returns `None` when nothing
    /// was running.
    pub async fn stop_session(&self) -> Result<Option<Session>> {
        let state = self.state().await?;
        if !state.is_running() {
            return Ok(None);
        }

        let now = self.clock.time();
        let mut sessions = self.repository.sessions().await?;
        let closed = match sessions
            .iter_mut()
            .find(|s| Some(s.id) == state.session_id)
        {
            Some(session) => {
                session.ended_at = Some(now);
                session.status = SessionStatus::Completed;
                Some(session.clone())
            }
            None => {
                warn!("Running session {:?} has no ledger row", state.session_id);
                None
            }
        };
        if closed.is_some() {
            self.repository.save_sessions(&sessions).await?;
        }

        let cycle_position = if state.session_type == Some(SessionType::Focus) {
            (state.cycle_position % LONG_BREAK_AFTER) + 1
        } else {
            state.cycle_position
        };
        self.repository
            .save_timer_state(&TimerState::idle(cycle_position))
            .await?;

        info!(
            "Stopped session {:?}, next cycle position {cycle_position}",
            state.session_id
        );
        Ok(closed)
    }

    /// Flags overtime. The session keeps running until it is stopped explicitly.
    pub async fn on_alarm_fired(&self) -> Result<Option<TimerState>> {
        let mut state = self.state().await?;
        if !state.is_running() {
            return Ok(None);
        }
        state.alarm_fired = true;
        self.repository.save_timer_state(&state).await?;
        info!("Session {:?} reached its nominal end", state.session_id);
        Ok(Some(state))
    }

    pub async fn suggest_next(&self) -> Result<SessionType> {
        let state = self.state().await?;
        let sessions = self.repository.sessions().await?;
        Ok(suggest(&state, sessions.last()))
    }

    pub async fn compute_streak(&self) -> Result<u32> {
        let sessions = self.repository.sessions().await?;
        Ok(compute_streak(&sessions, &self.clock.local_time()))
    }
}

/// Long-break detection reads the snapshot stored on the last ledger row rather than the
/// timer's own cycle position. Editing or reordering ledger rows changes the answer.
pub fn suggest(state: &TimerState, last: Option<&Session>) -> SessionType {
    if state.is_running() {
        return SessionType::Focus;
    }
    let last_focus = last.filter(|s| s.session_type.is_focus());
    match last_focus {
        Some(s)
            if state.cycle_position == 1
                && s.status == SessionStatus::Completed
                && s.cycle_position == LONG_BREAK_AFTER =>
        {
            SessionType::LongBreak
        }
        Some(_) => SessionType::ShortBreak,
        None => SessionType::Focus,
    }
}
