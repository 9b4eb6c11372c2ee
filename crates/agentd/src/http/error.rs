// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Single `IntoResponse` impl translating [`AgentError`] into the
//! `{code,title,message}` payload shape, with the HTTP status coming from
//! `AgentError::http_status()`.

use agent_types::AgentError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u16,
    title: &'static str,
    message: String,
}

pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody { code: self.0.http_status(), title: self.0.title(), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}
