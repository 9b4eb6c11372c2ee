// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! The container-facing half of an attach/detach: the volume mapper owns
//! the `id ↔ device` bookkeeping, but plumbing the device into the running
//! container is the container driver's job. Kept as a trait so `volume-map`
//! doesn't depend on `container-driver` directly.

use async_trait::async_trait;

#[async_trait]
pub trait VolumeBackend: Send + Sync {
    async fn attach_volume(&self, device: &str, mount_device: &str, static_mode: bool) -> anyhow::Result<()>;
    async fn detach_volume(&self, device: &str, mount_device: &str, static_mode: bool) -> anyhow::Result<()>;
}

/// A backend that does nothing, for volume-mapper tests and for the
/// `fake_execute` configuration.
pub struct NoopBackend;

#[async_trait]
impl VolumeBackend for NoopBackend {
    async fn attach_volume(&self, _device: &str, _mount_device: &str, _static_mode: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn detach_volume(&self, _device: &str, _mount_device: &str, _static_mode: bool) -> anyhow::Result<()> {
        Ok(())
    }
}
