// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C3: the network plumber — hybrid Linux-bridge/OVS/veth plumbing for a
//! single container, grounded on the grounding source's `net_util` package.

pub mod linux_net;
pub mod netns;
pub mod undo;
pub mod vif_driver;

pub use linux_net::LinuxNet;
pub use vif_driver::{VifDriver, INTEGRATION_BRIDGE};
