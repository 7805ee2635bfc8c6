use std::sync::Arc;

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    entities::{DomainVisit, Session, Settings, Task, TaskTimeEntry, TimerState},
    PersistentStore, StoreKey,
};

/// Typed view over a [PersistentStore]. Reads never fail because of missing or malformed data:
/// such values are replaced by their defaults. Only failures of the store itself propagate.
///
/// Collections decode row by row. The ledgers (sessions, task time entries, domain visits) keep
/// rows that don't decode when they are written back.
#[derive(Clone)]
pub struct StateRepository {
    store: Arc<dyn PersistentStore>,
}

impl StateRepository {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    async fn read_or_default<T: DeserializeOwned + Default>(&self, key: StoreKey) -> Result<T> {
        let Some(value) = self.store.get(key).await? else {
            return Ok(T::default());
        };
        match serde_json::from_value::<T>(value) {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!("Ignoring malformed value stored under {key}: {e}");
                Ok(T::default())
            }
        }
    }

    async fn write<T: Serialize>(&self, key: StoreKey, value: &T) -> Result<()> {
        self.store.set(key, serde_json::to_value(value)?).await
    }

    /// Splits a stored collection into the rows that decode and the raw rows that don't.
    async fn split_rows<T: DeserializeOwned>(
        &self,
        key: StoreKey,
    ) -> Result<(Vec<T>, Vec<Value>)> {
        let Some(value) = self.store.get(key).await? else {
            return Ok((vec![], vec![]));
        };
        let Value::Array(values) = value else {
            warn!("Ignoring value stored under {key}, it is not a list");
            return Ok((vec![], vec![]));
        };

        let mut rows = Vec::with_capacity(values.len());
        let mut malformed = vec![];
        for value in values {
            match T::deserialize(&value) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    debug!("Malformed row under {key}: {e}");
                    malformed.push(value);
                }
            }
        }
        Ok((rows, malformed))
    }

    async fn read_rows<T: DeserializeOwned>(&self, key: StoreKey) -> Result<Vec<T>> {
        let (rows, malformed) = self.split_rows::<T>(key).await?;
        if !malformed.is_empty() {
            warn!("Skipping {} malformed rows stored under {key}", malformed.len());
        }
        Ok(rows)
    }

    /// Writes a ledger back with the rows that failed to decode in front of it.
    async fn write_ledger<T: Serialize + DeserializeOwned>(
        &self,
        key: StoreKey,
        rows: &[T],
    ) -> Result<()> {
        let (_, mut values) = self.split_rows::<T>(key).await?;
        if !values.is_empty() {
            warn!("Keeping {} malformed rows stored under {key}", values.len());
        }
        for row in rows {
            values.push(serde_json::to_value(row)?);
        }
        self.store.set(key, Value::Array(values)).await
    }

    pub async fn timer_state(&self) -> Result<TimerState> {
        let mut state: TimerState = self.read_or_default(StoreKey::TimerState).await?;
        if state.cycle_position == 0 {
            state.cycle_position = 1;
        }
        Ok(state)
    }

    pub async fn save_timer_state(&self, state: &TimerState) -> Result<()> {
        self.write(StoreKey::TimerState, state).await
    }

    pub async fn sessions(&self) -> Result<Vec<Session>> {
        self.read_rows(StoreKey::Sessions).await
    }

    pub async fn save_sessions(&self, sessions: &[Session]) -> Result<()> {
        self.write_ledger(StoreKey::Sessions, sessions).await
    }

    pub async fn task_time_entries(&self) -> Result<Vec<TaskTimeEntry>> {
        self.read_rows(StoreKey::TaskTimeEntries).await
    }

    pub async fn save_task_time_entries(&self, entries: &[TaskTimeEntry]) -> Result<()> {
        self.write_ledger(StoreKey::TaskTimeEntries, entries).await
    }

    pub async fn domain_visits(&self) -> Result<Vec<DomainVisit>> {
        self.read_rows(StoreKey::DomainVisits).await
    }

    pub async fn save_domain_visits(&self, visits: &[DomainVisit]) -> Result<()> {
        self.write_ledger(StoreKey::DomainVisits, visits).await
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.read_or_default(StoreKey::Settings).await
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.write(StoreKey::Settings, settings).await
    }

    pub async fn tasks(&self) -> Result<Vec<Task>> {
        self.read_rows(StoreKey::Tasks).await
    }

    pub async fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        self.write(StoreKey::Tasks, &tasks).await
    }
}
