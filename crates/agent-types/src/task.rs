// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
use serde::{Deserialize, Serialize};

/// Id reserved for a task that synchronously completed as a success.
pub const FAKE_SUCCESS_TASK_ID: &str = "-1";
/// Id reserved for a task that synchronously completed as a failure.
pub const FAKE_ERROR_TASK_ID: &str = "-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Doing,
    Successful,
    Error,
}

impl TaskState {
    pub fn code(&self) -> u32 {
        match self {
            TaskState::Doing => 0,
            TaskState::Successful => 1,
            TaskState::Error => 2,
        }
    }
}

/// The payload returned by `GET /tasks/{id}` and by every endpoint that
/// hands back a task instead of completing synchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub code: u32,
    pub message: String,
}

impl TaskStatus {
    pub fn new(task_id: impl Into<String>, state: TaskState, detail: Option<&str>) -> Self {
        let task_id = task_id.into();
        let message = match state {
            TaskState::Doing => format!("Task {task_id} is doing"),
            TaskState::Successful => format!("Task {task_id} is successful"),
            TaskState::Error => format!(
                "Task {task_id} is error with {}",
                detail.unwrap_or("unknown error")
            ),
        };
        TaskStatus { task_id, code: state.code(), message }
    }

    pub fn fake_success() -> Self {
        Self::new(FAKE_SUCCESS_TASK_ID, TaskState::Successful, None)
    }

    pub fn fake_error(detail: &str) -> Self {
        Self::new(FAKE_ERROR_TASK_ID, TaskState::Error, Some(detail))
    }
}
