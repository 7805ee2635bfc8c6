//!  Persistence is an opaque async key-value store, see [PersistentStore].
//!  The basic idea is:
//!   - Every key holds one JSON document (the timer, or a whole collection).
//!   - Collections are read in full, mutated, and written back in full.
//!   - Typed access and defaulting live in [repository::StateRepository].

pub mod entities;
pub mod file;
pub mod memory;
pub mod repository;

use std::fmt::Display;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    TimerState,
    Sessions,
    TaskTimeEntries,
    DomainVisits,
    Settings,
    Tasks,
}

impl StoreKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKey::TimerState => "timerState",
            StoreKey::Sessions => "sessions",
            StoreKey::TaskTimeEntries => "taskTimeEntries",
            StoreKey::DomainVisits => "domainVisits",
            StoreKey::Settings => "settings",
            StoreKey::Tasks => "tasks",
        }
    }
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface for abstracting the key-value engine. Writes replace the whole value, there is no
/// transaction spanning a read and a later write.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: StoreKey) -> Result<Option<Value>>;

    async fn set(&self, key: StoreKey, value: Value) -> Result<()>;
}
