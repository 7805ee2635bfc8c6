use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    store::{entities::TaskTimeEntry, repository::StateRepository},
    utils::clock::Clock,
};

/// Records how long each task sits in the doing column while a focus session runs.
pub struct TaskTimeTracker {
    repository: StateRepository,
    clock: Arc<dyn Clock>,
}

impl TaskTimeTracker {
    pub fn new(repository: StateRepository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Id of the task currently in the doing column, if any.
    pub async fn doing_task(&self) -> Result<Option<String>> {
        let tasks = self.repository.tasks().await?;
        Ok(tasks.into_iter().find(|t| t.is_doing()).map(|t| t.id))
    }

    /// Opens an entry for `task_id` in the running focus session. Does nothing outside a focus
    /// session or when the task already has an open entry.
    pub async fn open_entry(&self, task_id: &str) -> Result<Option<TaskTimeEntry>> {
        let state = self.repository.timer_state().await?;
        let (true, Some(session_id)) = (state.is_focus_running(), state.session_id) else {
            debug!("No focus session running, not tracking task {task_id}");
            return Ok(None);
        };

        let mut entries = self.repository.task_time_entries().await?;
        if entries.iter().any(|e| e.task_id == task_id && e.is_open()) {
            debug!("Task {task_id} is already being tracked");
            return Ok(None);
        }

        let entry = TaskTimeEntry {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            session_id,
            started_at: self.clock.time(),
            ended_at: None,
        };
        entries.push(entry.clone());
        self.repository.save_task_time_entries(&entries).await?;
        info!("Tracking task {task_id} in session {session_id}");
        Ok(Some(entry))
    }

    /// Closes every open entry of `task_id`, returning how many were closed.
    pub async fn close_entry(&self, task_id: &str) -> Result<usize> {
        self.close_where(|e| e.task_id == task_id).await
    }

    /// Closes every open entry regardless of task.
    pub async fn close_all(&self) -> Result<usize> {
        self.close_where(|_| true).await
    }

    async fn close_where(&self, filter: impl Fn(&TaskTimeEntry) -> bool) -> Result<usize> {
        let mut entries = self.repository.task_time_entries().await?;
        let now = self.clock.time();
        let mut closed = 0;
        for entry in entries.iter_mut().filter(|e| e.is_open() && filter(e)) {
            entry.ended_at = Some(now);
            closed += 1;
        }
        if closed > 0 {
            self.repository.save_task_time_entries(&entries).await?;
            debug!("Closed {closed} task entries");
        }
        Ok(closed)
    }
}
