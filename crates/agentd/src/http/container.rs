// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! `/container/*` handlers, grounded on the grounding source's
//! `ContainerController.create_router` route table.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::agent::Agent;
use crate::controller::{
    AdminPasswordRequest, AttachInterfaceRequest, AttachVolumeRequest, CreateImageRequest,
    CreateRequest, DetachInterfaceRequest, DetachVolumeRequest, InjectFilesRequest, StartRequest,
};
use crate::http::error::ApiError;

const DEFAULT_STOP_TIMEOUT: u32 = 5;

pub fn router() -> Router<Arc<Agent>> {
    Router::new()
        .route("/container/create", post(create))
        .route("/container/start", post(start))
        .route("/container/stop", post(stop))
        .route("/container/restart", post(restart))
        .route("/container/pause", post(pause))
        .route("/container/unpause", post(unpause))
        .route("/container/attach-interface", post(attach_interface))
        .route("/container/detach-interface", post(detach_interface))
        .route("/container/attach-volume", post(attach_volume))
        .route("/container/detach-volume", post(detach_volume))
        .route("/container/inject-files", post(inject_files))
        .route("/container/admin-password", post(admin_password))
        .route("/container/create-image", post(create_image))
        .route("/container/console-output", get(console_output))
        .route("/container/status", get(status))
        .route("/container/image-info", get(image_info))
}

async fn create(State(agent): State<Arc<Agent>>, Json(req): Json<CreateRequest>) -> Result<impl IntoResponse, ApiError> {
    let task = agent.create(req).await?;
    Ok(Json(task))
}

async fn start(State(agent): State<Arc<Agent>>, Json(req): Json<StartRequest>) -> Result<StatusCode, ApiError> {
    agent.start(req).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop(State(agent): State<Arc<Agent>>) -> Result<String, ApiError> {
    Ok(agent.stop(DEFAULT_STOP_TIMEOUT).await?)
}

async fn restart(State(agent): State<Arc<Agent>>, Json(req): Json<StartRequest>) -> Result<StatusCode, ApiError> {
    agent.restart(req).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn pause(State(agent): State<Arc<Agent>>) -> Result<StatusCode, ApiError> {
    agent.pause().await?;
    Ok(StatusCode::OK)
}

async fn unpause(State(agent): State<Arc<Agent>>) -> Result<StatusCode, ApiError> {
    agent.unpause().await?;
    Ok(StatusCode::OK)
}

async fn attach_interface(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<AttachInterfaceRequest>,
) -> Result<StatusCode, ApiError> {
    agent.attach_interface(req).await?;
    Ok(StatusCode::OK)
}

async fn detach_interface(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<DetachInterfaceRequest>,
) -> Result<StatusCode, ApiError> {
    agent.detach_interface(req).await?;
    Ok(StatusCode::OK)
}

async fn attach_volume(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<AttachVolumeRequest>,
) -> Result<StatusCode, ApiError> {
    agent.attach_volume(req).await?;
    Ok(StatusCode::OK)
}

async fn detach_volume(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<DetachVolumeRequest>,
) -> Result<StatusCode, ApiError> {
    agent.detach_volume(req).await?;
    Ok(StatusCode::OK)
}

async fn inject_files(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<InjectFilesRequest>,
) -> Result<StatusCode, ApiError> {
    agent.inject_files(req).await?;
    Ok(StatusCode::OK)
}

async fn admin_password(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<AdminPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    agent.inject_password(req).await?;
    Ok(StatusCode::OK)
}

async fn create_image(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<CreateImageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = agent.create_image(req).await?;
    Ok(Json(task))
}

async fn console_output(State(agent): State<Arc<Agent>>) -> Result<impl IntoResponse, ApiError> {
    let logs = agent.console_output()?;
    Ok(Json(serde_json::json!({ "logs": logs })))
}

async fn status(State(agent): State<Arc<Agent>>) -> impl IntoResponse {
    let status = agent.status().await;
    Json(serde_json::json!({ "status": status }))
}

#[derive(Debug, Deserialize)]
struct ImageInfoQuery {
    image_name: String,
    image_id: String,
}

async fn image_info(
    State(agent): State<Arc<Agent>>,
    Query(q): Query<ImageInfoQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let info = agent.image_info(&q.image_name, &q.image_id)?;
    Ok(Json(info))
}
