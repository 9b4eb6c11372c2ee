// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
use serde::{Deserialize, Serialize};

/// The lifecycle states the container controller (C6) moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Absent,
    Created,
    Running,
    Paused,
}

/// Coarse status codes reported by `GET /container/status`, mirroring the
/// grounding source's flat `STATUS_CODE_MAP`/`STATUS_MESSAGE_MAP` but kept as
/// a single bidirectional Rust enum instead of a pair of parallel tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    ContainerManagerNotStarted,
    NoImage,
    NoContainer,
    Stopped,
    Running,
    Frozen,
}

impl StatusCode {
    pub fn code(&self) -> u32 {
        match self {
            StatusCode::ContainerManagerNotStarted => 1,
            StatusCode::NoImage => 2,
            StatusCode::NoContainer => 3,
            StatusCode::Stopped => 4,
            StatusCode::Running => 5,
            StatusCode::Frozen => 6,
        }
    }

    pub fn message(&self, name: &str) -> String {
        match self {
            StatusCode::ContainerManagerNotStarted => "Container manager not started".to_string(),
            StatusCode::NoImage => "No image exists".to_string(),
            StatusCode::NoContainer => "No container exists".to_string(),
            StatusCode::Stopped => format!("Container {name} is STOPPED"),
            StatusCode::Running => format!("Container {name} is RUNNING"),
            StatusCode::Frozen => format!("Container {name} is FROZEN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_table_is_stable() {
        assert_eq!(StatusCode::NoContainer.code(), 3);
        assert_eq!(StatusCode::Running.message("web"), "Container web is RUNNING");
    }
}
