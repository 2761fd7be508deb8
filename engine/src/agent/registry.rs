//! Session task registry
//!
//! Maps each session to its single live task. The registry is injected into
//! the controller so callers and tests can share or inspect it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use sdk::ports::EventSink;

use super::task::{TaskSnapshot, TaskState};

/// What the registry keeps for a live task
#[derive(Clone)]
pub struct TaskHandle {
    pub task_id: String,
    pub cancel: CancellationToken,
    pub sink: Arc<dyn EventSink>,
    pub state: TaskState,
    pub step: usize,
}

/// Mutex-guarded map from session id to live task
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskHandle>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, returning the handle it replaced
    pub async fn insert(&self, session_id: &str, handle: TaskHandle) -> Option<TaskHandle> {
        self.tasks.lock().await.insert(session_id.to_string(), handle)
    }

    /// Remove and return the session's task
    pub async fn take(&self, session_id: &str) -> Option<TaskHandle> {
        self.tasks.lock().await.remove(session_id)
    }

    /// Remove the session's entry only if it still belongs to `task_id`
    pub async fn remove_if_owned(&self, session_id: &str, task_id: &str) -> bool {
        let mut tasks = self.tasks.lock().await;
        match tasks.get(session_id) {
            Some(handle) if handle.task_id == task_id => {
                tasks.remove(session_id);
                true
            }
            _ => false,
        }
    }

    /// Refresh the published state of a task
    pub async fn update(&self, snapshot: &TaskSnapshot) {
        let mut tasks = self.tasks.lock().await;
        if let Some(handle) = tasks.get_mut(&snapshot.session_id) {
            if handle.task_id == snapshot.task_id {
                handle.state = snapshot.state;
                handle.step = snapshot.step;
            }
        }
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<TaskSnapshot> {
        self.tasks
            .lock()
            .await
            .get(session_id)
            .map(|handle| TaskSnapshot {
                task_id: handle.task_id.clone(),
                session_id: session_id.to_string(),
                state: handle.state,
                step: handle.step,
            })
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.tasks.lock().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}
