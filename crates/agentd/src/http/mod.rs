// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C11: the HTTP surface. One `axum::Router` per resource family, merged
//! into a single router carrying the `Agent` composition root as state, with
//! `tower-http`'s tracing layer wrapping request logging.

pub mod container;
pub mod error;
pub mod service;
pub mod sg;
pub mod tasks;
pub mod volumes;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::agent::Agent;

pub fn build_router(agent: Arc<Agent>) -> Router {
    Router::new()
        .merge(container::router())
        .merge(volumes::router())
        .merge(sg::router())
        .merge(tasks::router())
        .merge(service::router())
        .layer(TraceLayer::new_for_http())
        .with_state(agent)
}
