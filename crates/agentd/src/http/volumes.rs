// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! `/volumes/*` handlers, grounded on the grounding source's `volumes.py`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::agent::Agent;
use crate::http::error::ApiError;

pub fn router() -> Router<Arc<Agent>> {
    Router::new()
        .route("/volumes", get(list))
        .route("/volumes/clone", post(clone_volume))
        .route("/volumes/connect_volume", post(connect_volume))
        .route("/volumes/disconnect_volume", post(disconnect_volume))
        .route("/volumes/remove_device", post(remove_device))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_scan")]
    scan: u8,
}

fn default_scan() -> u8 {
    1
}

async fn list(State(agent): State<Arc<Agent>>, Query(q): Query<ListQuery>) -> Result<impl IntoResponse, ApiError> {
    let devices = agent.volumes.list(q.scan != 0).await?;
    let names: Vec<String> = devices.into_iter().map(|d| d.name).collect();
    Ok(Json(serde_json::json!({ "devices": names })))
}

#[derive(Debug, Deserialize)]
struct CloneRequest {
    volume: VolumeRef,
    src_vref: VolumeRef,
}

#[derive(Debug, Deserialize)]
struct VolumeRef {
    id: String,
    size: u64,
}

async fn clone_volume(State(agent): State<Arc<Agent>>, Json(req): Json<CloneRequest>) -> Result<impl IntoResponse, ApiError> {
    let task_id = agent
        .volumes
        .clone(&req.volume.id, req.volume.size, &req.src_vref.id, req.src_vref.size)
        .await?;
    Ok(Json(serde_json::json!({ "task_id": task_id })))
}

#[derive(Debug, Deserialize)]
struct ConnectionRequest {
    connection_properties: ConnectionProperties,
}

#[derive(Debug, Deserialize)]
struct ConnectionProperties {
    portal: String,
    target_iqn: String,
}

async fn connect_volume(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<ConnectionRequest>,
) -> Result<StatusCode, ApiError> {
    agent.volumes.connect_volume(&req.connection_properties.portal, &req.connection_properties.target_iqn).await?;
    Ok(StatusCode::OK)
}

async fn disconnect_volume(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<ConnectionRequest>,
) -> Result<StatusCode, ApiError> {
    agent.volumes.disconnect_volume(&req.connection_properties.portal, &req.connection_properties.target_iqn).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct RemoveDeviceRequest {
    device: String,
}

async fn remove_device(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<RemoveDeviceRequest>,
) -> Result<StatusCode, ApiError> {
    agent.volumes.remove_device(&req.device).await?;
    Ok(StatusCode::OK)
}
