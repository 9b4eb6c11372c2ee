// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C4: the container driver. Wraps the `lxc-*` command-line tools behind a
//! typed API and bridges the volume mapper's device-attach callback into
//! LXC's cgroup-allow / autodev-hook machinery.

pub mod devnum;
pub mod driver;
pub mod paths;
pub mod template;

pub use driver::{ContainerDriver, ContainerSummary, ContainerVolumeBackend};
pub use paths::LxcPaths;
