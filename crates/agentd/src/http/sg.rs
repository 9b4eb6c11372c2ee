// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! `/sg/*` handlers, grounded on the grounding source's `storagegateway.py`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::agent::Agent;
use crate::http::error::ApiError;

pub fn router() -> Router<Arc<Agent>> {
    Router::new()
        .route("/sg/enable_sg", post(enable_sg))
        .route("/sg/disable_sg", post(disable_sg))
        .route("/sg/enable_replication", post(noop))
        .route("/sg/disable_replication", post(noop))
        .route("/sg/create_snapshot", post(noop))
        .route("/sg/delete_snapshot", post(noop))
        .route("/sg/create_backup", post(noop))
        .route("/sg/delete_backup", post(noop))
}

#[derive(Debug, Deserialize)]
struct EnableSgRequest {
    target_iqn: String,
    volume_id: String,
    sg_device: String,
}

async fn enable_sg(State(agent): State<Arc<Agent>>, Json(req): Json<EnableSgRequest>) -> Result<StatusCode, ApiError> {
    agent.sg.enable_sg(&req.target_iqn, &req.volume_id, &req.sg_device).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct DisableSgRequest {
    target_iqn: String,
    volume_id: String,
}

async fn disable_sg(State(agent): State<Arc<Agent>>, Json(req): Json<DisableSgRequest>) -> Result<StatusCode, ApiError> {
    agent.sg.disable_sg(&req.target_iqn, &req.volume_id).await?;
    Ok(StatusCode::OK)
}

/// `enable_replication`/`disable_replication`/`{create,delete}_{snapshot,backup}`:
/// `pass`-bodied in the grounding source, wired here only to keep the route
/// table complete.
async fn noop() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}
