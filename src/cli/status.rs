use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;

use crate::{
    store::entities::{SessionType, TimerState},
    timer::{
        clock::{display, is_overtime},
        machine::TimerStateMachine,
    },
    utils::clock::{Clock, DefaultClock},
};

use super::{open_repository, DirArgs};

#[derive(Debug, Parser)]
pub struct StatusCommand {
    #[command(flatten)]
    pub dir: DirArgs,
}

pub async fn process_status_command(StatusCommand { dir }: StatusCommand) -> Result<()> {
    let repository = open_repository(&dir.resolve()?)?;
    let clock = Arc::new(DefaultClock);
    let machine = TimerStateMachine::new(repository, clock.clone());

    let state = machine.state().await?;
    let suggestion = machine.suggest_next().await?;
    let streak = machine.compute_streak().await?;
    println!("{}", render_status(&state, suggestion, streak, clock.time()));
    Ok(())
}

fn render_status(
    state: &TimerState,
    suggestion: SessionType,
    streak: u32,
    now: DateTime<Utc>,
) -> String {
    let timer = match state.running_type() {
        Some(session_type) if is_overtime(state, now) => {
            format!("{} {} (overtime)", session_type.label(), display(state, now))
        }
        Some(session_type) => format!("{} {} left", session_type.label(), display(state, now)),
        None => "Idle".to_string(),
    };
    let days = if streak == 1 { "day" } else { "days" };
    format!(
        "{timer}\nCycle: {}\nNext: {}\nStreak: {streak} {days}",
        state.cycle_position,
        suggestion.label()
    )
}
