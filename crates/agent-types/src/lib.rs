// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Shared data types for the wormhole agent: the on-the-wire shapes the
//! orchestrator sends us (VIF, BDM), the state we persist between restarts,
//! the task/status vocabulary, the typed configuration surface, and the
//! error enum every component's public API ultimately returns.

pub mod bdm;
pub mod config;
pub mod container;
pub mod error;
pub mod settings;
pub mod task;
pub mod vif;

pub use bdm::{Bdm, BlockDeviceInfo, ConnectionInfo, ConnectionInfoData};
pub use config::AgentConfig;
pub use container::{ContainerState, StatusCode};
pub use error::AgentError;
pub use settings::PersistedSettings;
pub use task::{TaskState, TaskStatus, FAKE_ERROR_TASK_ID, FAKE_SUCCESS_TASK_ID};
pub use vif::{Dns, Ip, Network, Subnet, Vif};
