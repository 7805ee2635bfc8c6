//! Pure readings of a [TimerState] snapshot. Nothing here touches the store, so badge refreshes
//! and UI polling can call these as often as they like.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    store::entities::{SessionType, TimerState},
    utils::time::format_clock,
};

const FOCUS_COLOR: &str = "#e94560";
const SHORT_BREAK_COLOR: &str = "#4ecdc4";
const LONG_BREAK_COLOR: &str = "#45b7d1";

pub fn elapsed(state: &TimerState, now: DateTime<Utc>) -> Duration {
    match (state.is_running(), state.started_at) {
        (true, Some(started_at)) => (now - started_at).max(Duration::zero()),
        _ => Duration::zero(),
    }
}

/// Time left before the nominal end. Zero when idle and once the nominal end has passed.
pub fn remaining(state: &TimerState, now: DateTime<Utc>) -> Duration {
    if !state.is_running() {
        return Duration::zero();
    }
    let nominal = Duration::seconds(i64::from(state.duration.unwrap_or(0)));
    (nominal - elapsed(state, now)).max(Duration::zero())
}

pub fn is_overtime(state: &TimerState, now: DateTime<Utc>) -> bool {
    state.is_running() && remaining(state, now).is_zero()
}

fn ceil_seconds(duration: Duration) -> i64 {
    (duration.num_milliseconds() + 999) / 1000
}

/// Countdown text while in time, `+mm:ss` of overtime afterwards.
pub fn display(state: &TimerState, now: DateTime<Utc>) -> String {
    if !state.is_running() {
        return "--:--".into();
    }
    if is_overtime(state, now) {
        let nominal = Duration::seconds(i64::from(state.duration.unwrap_or(0)));
        let over = elapsed(state, now) - nominal;
        format_clock(-over.num_seconds())
    } else {
        format_clock(ceil_seconds(remaining(state, now)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub text: String,
    pub color: Option<String>,
}

fn color_for(session_type: SessionType) -> &'static str {
    match session_type {
        SessionType::Focus => FOCUS_COLOR,
        SessionType::ShortBreak => SHORT_BREAK_COLOR,
        SessionType::LongBreak => LONG_BREAK_COLOR,
    }
}

pub fn badge(state: &TimerState, now: DateTime<Utc>) -> Badge {
    let Some(session_type) = state.running_type() else {
        return Badge {
            text: String::new(),
            color: None,
        };
    };
    if state.alarm_fired {
        return Badge {
            text: "!".into(),
            color: Some(FOCUS_COLOR.into()),
        };
    }
    let remaining_ms = remaining(state, now).num_milliseconds();
    let minutes = (remaining_ms + 59_999) / 60_000;
    Badge {
        text: minutes.to_string(),
        color: Some(color_for(session_type).into()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use crate::store::entities::{SessionType, TimerState, TimerStatus};

    use super::*;

    fn running(session_type: SessionType, duration: u32) -> TimerState {
        TimerState {
            status: TimerStatus::Running,
            session_type: Some(session_type),
            started_at: Some(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()),
            duration: Some(duration),
            cycle_position: 1,
            session_id: Some(Uuid::new_v4()),
            alarm_fired: false,
        }
    }

    #[test]
    fn test_idle_has_nothing_remaining() {
        let state = TimerState::default();
        let now = Utc::now();
        assert_eq!(remaining(&state, now), Duration::zero());
        assert!(!is_overtime(&state, now));
        assert_eq!(badge(&state, now).text, "");
    }

    #[test]
    fn test_remaining_counts_down() {
        let state = running(SessionType::Focus, 1500);
        let start = state.started_at.unwrap();
        assert_eq!(remaining(&state, start), Duration::seconds(1500));
        assert_eq!(
            remaining(&state, start + Duration::seconds(600)),
            Duration::seconds(900)
        );
        assert_eq!(display(&state, start + Duration::milliseconds(500)), "25:00");
    }

    #[test]
    fn test_overtime_after_nominal_end() {
        let state = running(SessionType::ShortBreak, 300);
        let start = state.started_at.unwrap();
        assert!(!is_overtime(&state, start + Duration::seconds(299)));
        assert!(is_overtime(&state, start + Duration::seconds(300)));
        assert_eq!(display(&state, start + Duration::seconds(375)), "+01:15");
    }

    #[test]
    fn test_badge_rounds_minutes_up() {
        let state = running(SessionType::LongBreak, 900);
        let start = state.started_at.unwrap();
        let badge_value = badge(&state, start + Duration::seconds(1));
        assert_eq!(badge_value.text, "15");
        assert_eq!(badge_value.color.as_deref(), Some("#45b7d1"));
    }

    #[test]
    fn test_badge_after_alarm() {
        let mut state = running(SessionType::Focus, 1500);
        state.alarm_fired = true;
        assert_eq!(badge(&state, Utc::now()).text, "!");
    }
}
