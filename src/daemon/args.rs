use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;

use super::alarm::DEFAULT_BADGE_INTERVAL;

/// What to do at startup with domain visits an earlier run never closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OrphanedVisits {
    /// Report them and leave them open.
    #[default]
    Leave,
    /// Close them at the time of the restart.
    Close,
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Origin of the extension, used until the browser reports its own.
    #[arg(long = "extension-origin", default_value = "")]
    pub extension_origin: String,
    /// Seconds between badge refreshes.
    #[arg(long = "badge-interval", value_parser = parse_seconds, default_value = "1")]
    pub badge_interval: Duration,
    #[arg(long = "orphaned-visits", value_enum, default_value_t)]
    pub orphaned_visits: OrphanedVisits,
    /// Mirrors logs to stderr. This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds = value
        .parse::<u64>()
        .map_err(|e| format!("Expected whole seconds: {e}"))?;
    if seconds == 0 {
        return Ok(DEFAULT_BADGE_INTERVAL);
    }
    Ok(Duration::from_secs(seconds))
}
