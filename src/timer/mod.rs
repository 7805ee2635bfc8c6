//! Work/break timer: the persisted state machine, its pure clock readings and streaks.

pub mod clock;
pub mod machine;
pub mod streak;

use crate::store::entities::SessionType;

pub const FOCUS_DURATION: u32 = 25 * 60;
pub const SHORT_BREAK_DURATION: u32 = 5 * 60;
pub const LONG_BREAK_DURATION: u32 = 15 * 60;

/// Focus sessions per cycle. The cycle position wraps back to 1 after this many.
pub const LONG_BREAK_AFTER: u32 = 4;

/// Nominal length of a session in seconds.
pub fn nominal_duration(session_type: SessionType) -> u32 {
    match session_type {
        SessionType::Focus => FOCUS_DURATION,
        SessionType::ShortBreak => SHORT_BREAK_DURATION,
        SessionType::LongBreak => LONG_BREAK_DURATION,
    }
}
