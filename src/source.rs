//! Local task source
//!
//! The reconciler reads tasks through [`TaskSource`] so passes can run
//! against Taskwarrior or a fixed task list.

use crate::Result;
use async_trait::async_trait;
use taskwarrior::{Task, TaskWarrior};

/// Supplier of pending tasks
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Every pending task, in source order
    async fn load_pending_tasks(&self) -> Result<Vec<Task>>;
}

#[async_trait]
impl TaskSource for TaskWarrior {
    async fn load_pending_tasks(&self) -> Result<Vec<Task>> {
        let tw = self.clone();
        let tasks = tokio::task::spawn_blocking(move || tw.pending())
            .await
            .map_err(|e| crate::TjsError::Other(format!("Task export panicked: {}", e)))??;

        tracing::debug!(count = tasks.len(), "Loaded pending tasks from Taskwarrior");
        Ok(tasks)
    }
}

#[async_trait]
impl TaskSource for Vec<Task> {
    async fn load_pending_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.clone())
    }
}
