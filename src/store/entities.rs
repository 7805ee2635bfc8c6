use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    Focus,
    ShortBreak,
    LongBreak,
}

impl SessionType {
    pub fn is_focus(self) -> bool {
        self == SessionType::Focus
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionType::Focus => "Focus",
            SessionType::ShortBreak => "Short Break",
            SessionType::LongBreak => "Long Break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
}

/// The single persisted timer. Fields missing from the stored object fall back to
/// [TimerState::default], so older or partial records still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    #[serde(rename = "type")]
    pub session_type: Option<SessionType>,
    pub started_at: Option<DateTime<Utc>>,
    /// Nominal length in seconds.
    pub duration: Option<u32>,
    pub cycle_position: u32,
    pub session_id: Option<Uuid>,
    pub alarm_fired: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::idle(1)
    }
}

impl TimerState {
    pub fn idle(cycle_position: u32) -> Self {
        Self {
            status: TimerStatus::Idle,
            session_type: None,
            started_at: None,
            duration: None,
            cycle_position,
            session_id: None,
            alarm_fired: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    /// Running session type, `None` when idle.
    pub fn running_type(&self) -> Option<SessionType> {
        if self.is_running() {
            self.session_type
        } else {
            None
        }
    }

    pub fn is_focus_running(&self) -> bool {
        self.running_type() == Some(SessionType::Focus)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Running,
    Completed,
}

/// A row of the append-only session ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub cycle_position: u32,
}

impl Session {
    pub fn is_completed_focus(&self) -> bool {
        self.session_type.is_focus() && self.status == SessionStatus::Completed
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTimeEntry {
    pub id: Uuid,
    pub task_id: String,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskTimeEntry {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainVisit {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Hostname only, never the full URL.
    pub domain: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl DomainVisit {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagStyle {
    pub display_name: String,
    pub color: String,
}

pub const DEFAULT_BLOCKED_DOMAINS: [&str; 3] = ["x.com", "web.whatsapp.com", "mail.google.com"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub blocked_domains: Vec<String>,
    pub tags: BTreeMap<String, TagStyle>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            blocked_domains: DEFAULT_BLOCKED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            tags: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Blocked hostnames in their configured order, normalized and without duplicates.
    pub fn blocklist(&self) -> Vec<String> {
        let mut domains: Vec<String> = Vec::with_capacity(self.blocked_domains.len());
        for domain in &self.blocked_domains {
            let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
            if !domain.is_empty() && !domains.contains(&domain) {
                domains.push(domain);
            }
        }
        domains
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskColumn {
    Todo,
    Doing,
    Done,
    Cleared,
}

/// Board task. Only `id` and `column` are interpreted here; everything else the board stores
/// is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub column: TaskColumn,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Task {
    pub fn is_doing(&self) -> bool {
        self.column == TaskColumn::Doing
    }
}
