// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C2 (volume mapper) and C7 (volume controller): the host-side half of
//! block-volume lifecycle. Owns the `volume_id -> /dev/xxx` symlink
//! directory, reconciles it against a requested block-device mapping, and
//! exposes the higher-level listing/clone/connect operations the HTTP
//! surface drives directly.

pub mod backend;
pub mod blocksize;
pub mod controller;
pub mod mapper;

pub use backend::{NoopBackend, VolumeBackend};
pub use controller::VolumeController;
pub use mapper::{HostDevice, VolumeMapper};
