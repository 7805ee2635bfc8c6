use anyhow::Result;
use chrono::{Local, TimeZone};
use clap::Parser;

use crate::{store::entities::Session, utils::time::format_duration};

use super::{open_repository, DirArgs};

#[derive(Debug, Parser)]
pub struct SessionsCommand {
    #[command(flatten)]
    pub dir: DirArgs,
    #[arg(short, long, default_value_t = 10, help = "Number of sessions to show")]
    pub limit: usize,
}

pub async fn process_sessions_command(
    SessionsCommand { dir, limit }: SessionsCommand,
) -> Result<()> {
    let repository = open_repository(&dir.resolve()?)?;
    let sessions = repository.sessions().await?;
    if sessions.is_empty() {
        println!("No sessions yet");
        return Ok(());
    }
    for line in render_sessions(&sessions, limit, &Local) {
        println!("{line}");
    }
    Ok(())
}

/// Latest `limit` sessions, oldest first.
fn render_sessions<Tz: TimeZone>(sessions: &[Session], limit: usize, tz: &Tz) -> Vec<String>
where
    Tz::Offset: std::fmt::Display,
{
    let skip = sessions.len().saturating_sub(limit);
    sessions
        .iter()
        .skip(skip)
        .map(|session| {
            let started = session.started_at.with_timezone(tz).format("%Y-%m-%d %H:%M");
            let length = match session.elapsed() {
                Some(elapsed) => format_duration(elapsed.num_seconds()),
                None => "running".to_string(),
            };
            format!(
                "{started}  {:<11}  {length}",
                session.session_type.label()
            )
        })
        .collect()
}
