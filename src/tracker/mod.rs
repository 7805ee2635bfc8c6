//! Interval tracking for the two kinds of session. [task_time::TaskTimeTracker] is active during
//! focus sessions, [domain_visit::DomainVisitTracker] during breaks.

pub mod domain_visit;
pub mod task_time;
