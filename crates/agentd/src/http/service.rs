// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! `/service/personality` handler: a host-side file writer used only for
//! provisioning, grounded on the grounding source's `host.py` (`HostController.personality`).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use agent_types::AgentError;

use crate::agent::Agent;
use crate::http::error::ApiError;

pub fn router() -> Router<Arc<Agent>> {
    Router::new().route("/service/personality", post(personality))
}

#[derive(Debug, Deserialize)]
struct PersonalityRequest {
    dst_path: String,
    file_data: String,
}

async fn personality(State(_agent): State<Arc<Agent>>, Json(req): Json<PersonalityRequest>) -> Result<StatusCode, ApiError> {
    let decoded = base64::decode(&req.file_data)
        .map_err(|e| AgentError::InvalidInput { reason: format!("invalid base64 file_data: {e}") })?;
    let dst_path = std::path::Path::new(&req.dst_path);
    if let Some(parent) = dst_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AgentError::InjectFailed { path: req.dst_path.clone(), reason: e.to_string() })?;
    }
    std::fs::write(dst_path, decoded)
        .map_err(|e| AgentError::InjectFailed { path: req.dst_path.clone(), reason: e.to_string() })?;
    Ok(StatusCode::NO_CONTENT)
}
