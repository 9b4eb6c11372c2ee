// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! `/tasks/{id}` handler, grounded on the grounding source's `tasks.py`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use agent_types::AgentError;

use crate::agent::Agent;
use crate::http::error::ApiError;

pub fn router() -> Router<Arc<Agent>> {
    Router::new().route("/tasks/:task", get(query))
}

async fn query(State(agent): State<Arc<Agent>>, Path(task): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let status = agent
        .tasks
        .query(&task)
        .await
        .map_err(|_| AgentError::TaskNotFound { id: task.clone() })?;
    Ok(Json(status))
}
