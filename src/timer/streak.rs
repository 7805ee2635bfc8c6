use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, TimeZone};

use crate::{store::entities::Session, utils::time::calendar_day};

/// Bounds the backward scan so a corrupted ledger can't keep it going.
pub const STREAK_SCAN_LIMIT: u32 = 365;

/// Number of consecutive calendar days, ending today or yesterday, that contain at least one
/// completed focus session. Days are taken in the timezone of `now`.
pub fn compute_streak<Tz: TimeZone>(sessions: &[Session], now: &DateTime<Tz>) -> u32 {
    let timezone = now.timezone();
    let days = sessions
        .iter()
        .filter(|s| s.is_completed_focus())
        .map(|s| calendar_day(&s.started_at, &timezone))
        .collect::<HashSet<NaiveDate>>();

    let today = now.date_naive();
    let mut day = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };

    let mut streak = 0;
    while streak < STREAK_SCAN_LIMIT && days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(previous) => day = previous,
            None => break,
        }
    }
    streak
}
