// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
use serde::{Deserialize, Serialize};

/// A single block-device-mapping entry as submitted by the orchestrator on
/// `create`/`start`/`attach-volume`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bdm {
    pub mount_device: String,
    /// Size in gigabytes, e.g. `3` for "3G". `0` means "unknown" and is
    /// matched against any size bucket during reconciliation.
    #[serde(default)]
    pub size: u64,
    pub connection_info: ConnectionInfo,
    #[serde(default)]
    pub real_device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub data: ConnectionInfoData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfoData {
    pub volume_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockDeviceInfo {
    #[serde(default)]
    pub block_device_mapping: Vec<Bdm>,
}

impl Bdm {
    pub fn volume_id(&self) -> &str {
        &self.connection_info.data.volume_id
    }
}
