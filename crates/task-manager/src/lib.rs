// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Background task tracking for the long-running operations the HTTP
//! surface kicks off and returns a task id for (volume format, container
//! start, image pull) instead of blocking the request on them.
//!
//! Mirrors the grounding source's `TaskManager`: a monotonic id per task, a
//! callback run on a green thread, and a status lookup. `tokio::spawn`
//! stands in for `eventlet.greenthread.spawn`.

use std::collections::HashMap;
use std::sync::Arc;

use agent_types::{TaskState, TaskStatus};
use slog::warn;
use sys_util::sl;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskNotFound;

impl std::fmt::Display for TaskNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task not found")
    }
}

impl std::error::Error for TaskNotFound {}

#[derive(Debug, Default)]
pub struct TaskManager {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<String, TaskStatus>,
    next_id: u64,
}

impl TaskManager {
    pub fn new() -> Self {
        TaskManager::default()
    }

    /// Spawns `callback` on the async runtime and returns its task id
    /// immediately; `callback`'s `Ok(detail)` or `Err(detail)` becomes the
    /// task's final status message.
    pub async fn add<F>(&self, callback: F) -> String
    where
        F: FnOnce() -> Result<String, String> + Send + 'static,
    {
        let task_id = {
            let mut inner = self.inner.lock().await;
            let id = inner.next_id.to_string();
            inner.next_id += 1;
            inner.tasks.insert(
                id.clone(),
                TaskStatus::new(id.clone(), TaskState::Doing, None),
            );
            id
        };

        let inner = Arc::clone(&self.inner);
        let id_for_task = task_id.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(callback).await;
            let status = match result {
                Ok(Ok(_detail)) => TaskStatus::new(id_for_task.clone(), TaskState::Successful, None),
                Ok(Err(detail)) => {
                    warn!(sl!(), "task failed"; "task_id" => &id_for_task, "detail" => &detail);
                    TaskStatus::new(id_for_task.clone(), TaskState::Error, Some(&detail))
                }
                Err(e) => {
                    warn!(sl!(), "task panicked"; "task_id" => &id_for_task, "error" => %e);
                    TaskStatus::new(id_for_task.clone(), TaskState::Error, Some(&e.to_string()))
                }
            };
            inner.lock().await.tasks.insert(id_for_task, status);
        });

        task_id
    }

    pub async fn query(&self, task_id: &str) -> Result<TaskStatus, TaskNotFound> {
        self.inner
            .lock()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or(TaskNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_task_reaches_successful_state() {
        let mgr = TaskManager::new();
        let id = mgr.add(|| Ok("done".to_string())).await;
        for _ in 0..50 {
            let status = mgr.query(&id).await.unwrap();
            if status.code != 0 {
                assert_eq!(status.code, 1);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("task never completed");
    }

    #[tokio::test]
    async fn failing_task_reaches_error_state() {
        let mgr = TaskManager::new();
        let id = mgr.add(|| Err("boom".to_string())).await;
        for _ in 0..50 {
            let status = mgr.query(&id).await.unwrap();
            if status.code != 0 {
                assert_eq!(status.code, 2);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("task never completed");
    }

    #[tokio::test]
    async fn unknown_task_id_is_not_found() {
        let mgr = TaskManager::new();
        assert!(mgr.query("nope").await.is_err());
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let mgr = TaskManager::new();
        let a = mgr.add(|| Ok(String::new())).await;
        let b = mgr.add(|| Ok(String::new())).await;
        assert_eq!(a, "0");
        assert_eq!(b, "1");
    }
}
