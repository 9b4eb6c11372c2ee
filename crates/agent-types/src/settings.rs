// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
use serde::{Deserialize, Serialize};

use crate::{BlockDeviceInfo, Vif};

/// The last network/volume manifests the orchestrator handed us on `start`,
/// persisted to `settings_path` so they can be replayed across an agent
/// restart when interfaces are attached or detached individually.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedSettings {
    #[serde(default)]
    pub network_info: Vec<Vif>,
    #[serde(default)]
    pub block_device_info: BlockDeviceInfo,
}
