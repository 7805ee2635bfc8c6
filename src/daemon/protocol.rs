//! Frames exchanged with the extension over stdio, one JSON document per line.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    browser::{mirror::HostCommand, BrowserEvent},
    store::entities::{SessionType, Settings, Task},
};

use super::alarm::Alarm;

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Inbound {
    /// `body` is decoded separately so a bad request can still be answered under its id.
    Message { id: RequestId, body: Value },
    Event { body: BrowserEvent },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outbound {
    Response { id: RequestId, body: Value },
    Command { body: HostCommand },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    StartSession {
        #[serde(rename = "type")]
        session_type: SessionType,
    },
    StopSession,
    GetTimerState,
    GetSuggestedNext,
    GetStreak,
    TaskMovedToDoing {
        task_id: String,
    },
    TaskMovedFromDoing {
        task_id: String,
    },
    GetTasks,
    SaveTasks {
        tasks: Vec<Task>,
    },
    GetSettings,
    SaveSettings {
        settings: Settings,
    },
    GetSessions,
    GetTaskTimeEntries,
    GetDomainVisits,
    UpdateTask {
        task: Task,
    },
}

/// Everything the service loop reacts to, in arrival order.
#[derive(Debug)]
pub enum Input {
    Message { id: RequestId, body: Value },
    Event(BrowserEvent),
    Alarm(Alarm),
}

impl From<Inbound> for Input {
    fn from(value: Inbound) -> Self {
        match value {
            Inbound::Message { id, body } => Input::Message { id, body },
            Inbound::Event { body } => Input::Event(body),
        }
    }
}

pub fn ack() -> Value {
    json!({ "ok": true })
}

pub fn error_reply(message: impl std::fmt::Display) -> Value {
    json!({ "error": message.to_string() })
}
