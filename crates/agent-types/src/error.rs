// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
use thiserror::Error;

/// The semantic error kinds from the error-handling design: every controller
/// ultimately fails with one of these, which the HTTP layer maps to a
/// `{code,title,message}` payload and an HTTP status.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("expecting to find {attribute} in {target}")]
    Validation { attribute: String, target: String },

    #[error("container not found")]
    ContainerNotFound,

    #[error("image {id} not found")]
    ImageNotFound { id: String },

    #[error("volume {id} not found")]
    VolumeNotFound { id: String },

    #[error("task {id} not found")]
    TaskNotFound { id: String },

    #[error("dir {dir} not found")]
    DirNotFound { dir: String },

    #[error("container already exists")]
    ContainerExists,

    #[error("command failed: {argv:?} exit={exit_code:?}: {stderr}")]
    BackendFailure { argv: Vec<String>, exit_code: Option<i32>, stdout: String, stderr: String },

    #[error("inject file {path} failed: {reason}")]
    InjectFailed { path: String, reason: String },

    #[error("unable to start container")]
    ContainerStartFailed { source: anyhow::Error },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl AgentError {
    /// HTTP status code, per §7's error-kind table.
    pub fn http_status(&self) -> u16 {
        match self {
            AgentError::Validation { .. } | AgentError::InvalidInput { .. } => 400,
            AgentError::ContainerExists => 409,
            AgentError::ContainerNotFound
            | AgentError::ImageNotFound { .. }
            | AgentError::VolumeNotFound { .. }
            | AgentError::TaskNotFound { .. }
            | AgentError::DirNotFound { .. } => 404,
            AgentError::BackendFailure { .. }
            | AgentError::InjectFailed { .. }
            | AgentError::ContainerStartFailed { .. }
            | AgentError::Unexpected(_) => 500,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AgentError::Validation { .. } => "Bad Request",
            AgentError::InvalidInput { .. } => "Bad Request",
            AgentError::ContainerExists => "Conflict",
            AgentError::ContainerNotFound => "Container Not Found",
            AgentError::ImageNotFound { .. } => "Image Not Found",
            AgentError::VolumeNotFound { .. } => "Volume Not Found",
            AgentError::TaskNotFound { .. } => "Task Not Found",
            AgentError::DirNotFound { .. } => "Dir Not Found",
            AgentError::BackendFailure { .. } => "Backend Failure",
            AgentError::InjectFailed { .. } => "Inject Failed",
            AgentError::ContainerStartFailed { .. } => "Container Start Failed",
            AgentError::Unexpected(_) => "Internal Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_kind_table() {
        assert_eq!(AgentError::ContainerExists.http_status(), 409);
        assert_eq!(AgentError::VolumeNotFound { id: "v".into() }.http_status(), 404);
        assert_eq!(
            AgentError::InvalidInput { reason: "x".into() }.http_status(),
            400
        );
    }
}
