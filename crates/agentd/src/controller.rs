// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C6: the container controller. The orchestration logic layered on top of
//! the driver (C4), network plumber (C3) and volume mapper (C2): the
//! lifecycle state machine, manifest reconciliation, and the handful of
//! ambient host-side operations (admin-password injection, image commit).
//!
//! Grounded on the grounding source's `ContainerController` (`container.py`)
//! for the lifecycle sequencing, adapted from its docker-backed VIF
//! attach/detach ordering to the LXC driver's pid-polling/netns model.

use std::sync::Arc;

use agent_types::{
    AgentError, BlockDeviceInfo, ContainerState, StatusCode, TaskState, TaskStatus, Vif,
};
use serde::{Deserialize, Serialize};
use slog::{info, warn};
use sys_util::sl;

use crate::agent::Agent;

const CONTAINER_NAME: &str = "wormhole";
const STOP_TIMEOUT_CAP: u32 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequest {
    pub image_name: String,
    pub image_id: String,
    #[serde(default)]
    pub root_volume_id: Option<String>,
    #[serde(default)]
    pub network_info: Vec<Vif>,
    #[serde(default)]
    pub block_device_info: BlockDeviceInfo,
    #[serde(default)]
    pub inject_files: Vec<(String, String)>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub network_info: Vec<Vif>,
    #[serde(default)]
    pub block_device_info: BlockDeviceInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachInterfaceRequest {
    pub vif: Vif,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetachInterfaceRequest {
    pub vif: Vif,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachVolumeRequest {
    pub volume: String,
    #[serde(default)]
    pub device: Option<String>,
    pub mount_device: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetachVolumeRequest {
    pub volume: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InjectFilesRequest {
    pub inject_files: Vec<(String, String)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminPasswordRequest {
    pub admin_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateImageRequest {
    pub image_name: String,
    pub image_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageInfoResponse {
    pub name: String,
    pub id: String,
    pub size: u64,
}

impl Agent {
    fn container_name(&self) -> &'static str {
        CONTAINER_NAME
    }

    async fn require_container(&self) -> Result<(), AgentError> {
        let slot = self.slot.lock().await;
        if slot.name.is_none() {
            return Err(AgentError::ContainerNotFound);
        }
        Ok(())
    }

    /// `create(image_name, image_id, …)`: the only other Task-returning
    /// endpoint besides `create_image`, since a first create may need to
    /// provision a root volume symlink and run a (synchronous, here) image
    /// pull step before the driver call.
    pub async fn create(self: Arc<Self>, req: CreateRequest) -> Result<TaskStatus, AgentError> {
        let already_exists = { self.slot.lock().await.name.is_some() };
        if already_exists {
            warn!(sl!(), "container already exists, re-running inject/attach only");
            self.clone().reinject(&req).await?;
            return Ok(TaskStatus::fake_success());
        }

        let agent = Arc::clone(&self);
        let task_id = self
            .tasks
            .add(move || {
                let handle = tokio::runtime::Handle::current();
                handle.block_on(async move { agent.do_create(req).await.map_err(|e| e.to_string()) })
            })
            .await;
        Ok(TaskStatus::new(task_id, TaskState::Doing, None))
    }

    async fn do_create(self: Arc<Self>, req: CreateRequest) -> Result<String, AgentError> {
        if let Some(root_volume_id) = &req.root_volume_id {
            self.mapper
                .add_mapping(root_volume_id, "none", None, true)
                .await?;
        }

        self.driver.create(self.container_name()).await?;
        self.active_backend.set_container(Some(self.container_name().to_string()));

        {
            let mut slot = self.slot.lock().await;
            slot.name = Some(self.container_name().to_string());
            slot.state = Some(ContainerState::Created);
            slot.image_name = Some(req.image_name.clone());
            slot.image_id = Some(req.image_id.clone());
        }

        self.clone().reinject(&req).await?;
        info!(sl!(), "container created"; "name" => self.container_name(), "image_name" => &req.image_name);
        Ok(self.container_name().to_string())
    }

    /// The inject/attach steps re-run both on a fresh `create` and on a
    /// `create` against an already-existing container.
    async fn reinject(self: Arc<Self>, req: &CreateRequest) -> Result<(), AgentError> {
        for (path, content) in &req.inject_files {
            self.driver.inject_file(path, content.as_bytes())?;
        }
        if let Some(password) = &req.admin_password {
            crate::password::inject_admin_password(&self.driver, password)?;
        }
        for bdm in &req.block_device_info.block_device_mapping {
            self.mapper
                .add_mapping(bdm.volume_id(), &bdm.mount_device, bdm.real_device.as_deref(), true)
                .await?;
        }
        Ok(())
    }

    /// `start(network_info, bdm)`: reconcile the block-device manifest,
    /// plug every VIF, start the driver, wait for the container's pid and
    /// bind its netns, then attach every VIF inside it.
    pub async fn start(&self, req: StartRequest) -> Result<(), AgentError> {
        self.require_container().await?;
        let name = self.container_name().to_string();

        self.mapper.update_bdm(&req.block_device_info).await?;

        for vif in &req.network_info {
            self.vif_driver.plug(vif, &name).await?;
        }

        self.driver
            .start(&name, &req.network_info, 20)
            .await
            .map_err(|e| AgentError::ContainerStartFailed { source: anyhow::anyhow!(e) })?;

        let driver = Arc::clone(&self.driver);
        let container_id = name.clone();
        let pid = net_plumb::netns::find_container_pid(|| {
            let driver = Arc::clone(&driver);
            let container_id = container_id.clone();
            async move { driver.inspect(&container_id).await.map(|p| p.unwrap_or(0)).map_err(|e| anyhow::anyhow!(e)) }
        })
        .await?;
        net_plumb::netns::attach_netns(&name, pid).map_err(AgentError::Unexpected)?;

        for vif in &req.network_info {
            let eth_name = net_plumb::netns::available_eth_name(&self.runner, &name).await.map_err(AgentError::Unexpected)?;
            self.vif_driver.attach(vif, &name, &eth_name).await?;
        }

        {
            let mut slot = self.slot.lock().await;
            slot.state = Some(ContainerState::Running);
            slot.settings.network_info = req.network_info.clone();
            slot.settings.block_device_info = req.block_device_info.clone();
        }
        self.persist_settings(&self.slot.lock().await.settings.clone()).await.map_err(AgentError::Unexpected)?;

        info!(sl!(), "container started"; "name" => name.as_str());
        Ok(())
    }

    /// `stop(t)`: `driver.stop` capped at [`STOP_TIMEOUT_CAP`] seconds;
    /// retries once with the caller's full timeout after an unpause, since a
    /// frozen container refuses to stop directly.
    pub async fn stop(&self, timeout_secs: u32) -> Result<String, AgentError> {
        self.require_container().await?;
        let name = self.container_name().to_string();
        let capped = timeout_secs.min(STOP_TIMEOUT_CAP);

        let result = self.driver.stop(&name, capped).await;
        let message = match result {
            Ok(msg) => msg,
            Err(_) => {
                self.driver.unpause(&name).await?;
                self.driver.stop(&name, timeout_secs).await?
            }
        };

        {
            let mut slot = self.slot.lock().await;
            slot.state = Some(ContainerState::Created);
        }
        net_plumb::netns::detach_netns(&name).map_err(AgentError::Unexpected)?;

        Ok(message.unwrap_or_else(|| format!("container {name} stopped")))
    }

    /// `restart(network_info, bdm)`: stop, tear down network, then start.
    pub async fn restart(&self, req: StartRequest) -> Result<(), AgentError> {
        self.require_container().await?;
        let _ = self.stop(STOP_TIMEOUT_CAP).await;
        for vif in &req.network_info {
            self.vif_driver.unplug(vif).await?;
        }
        self.start(req).await
    }

    pub async fn pause(&self) -> Result<(), AgentError> {
        self.require_container().await?;
        self.driver.pause(self.container_name()).await?;
        self.slot.lock().await.state = Some(ContainerState::Paused);
        Ok(())
    }

    pub async fn unpause(&self) -> Result<(), AgentError> {
        self.require_container().await?;
        self.driver.unpause(self.container_name()).await?;
        self.slot.lock().await.state = Some(ContainerState::Running);
        Ok(())
    }

    pub async fn attach_interface(&self, req: AttachInterfaceRequest) -> Result<(), AgentError> {
        self.require_container().await?;
        let name = self.container_name().to_string();
        self.vif_driver.plug(&req.vif, &name).await?;
        let eth_name = net_plumb::netns::available_eth_name(&self.runner, &name).await.map_err(AgentError::Unexpected)?;
        self.vif_driver.attach(&req.vif, &name, &eth_name).await?;
        self.slot.lock().await.settings.network_info.push(req.vif);
        let settings = self.slot.lock().await.settings.clone();
        self.persist_settings(&settings).await.map_err(AgentError::Unexpected)
    }

    pub async fn detach_interface(&self, req: DetachInterfaceRequest) -> Result<(), AgentError> {
        self.require_container().await?;
        self.vif_driver.unplug(&req.vif).await?;
        {
            let mut slot = self.slot.lock().await;
            slot.settings.network_info.retain(|v| v.id != req.vif.id);
        }
        let settings = self.slot.lock().await.settings.clone();
        self.persist_settings(&settings).await.map_err(AgentError::Unexpected)
    }

    /// `attach_volume(id,dev,mp)`: any state; dynamic mode whenever the
    /// container is currently running.
    pub async fn attach_volume(&self, req: AttachVolumeRequest) -> Result<(), AgentError> {
        let running = matches!(self.slot.lock().await.state, Some(ContainerState::Running));
        self.mapper
            .add_mapping(&req.volume, &req.mount_device, req.device.as_deref(), !running)
            .await
    }

    pub async fn detach_volume(&self, req: DetachVolumeRequest) -> Result<(), AgentError> {
        let running = matches!(self.slot.lock().await.state, Some(ContainerState::Running));
        self.mapper.remove_mapping(&req.volume, true, !running).await
    }

    pub async fn inject_files(&self, req: InjectFilesRequest) -> Result<(), AgentError> {
        self.require_container().await?;
        for (path, content) in &req.inject_files {
            self.driver.inject_file(path, content.as_bytes())?;
        }
        Ok(())
    }

    pub async fn inject_password(&self, req: AdminPasswordRequest) -> Result<(), AgentError> {
        self.require_container().await?;
        crate::password::inject_admin_password(&self.driver, &req.admin_password)
    }

    /// `create_image(name,tag)`: async commit, scheduled as a task like
    /// `create`.
    pub async fn create_image(self: Arc<Self>, req: CreateImageRequest) -> Result<TaskStatus, AgentError> {
        self.require_container().await?;
        let agent = Arc::clone(&self);
        let task_id = self
            .tasks
            .add(move || {
                let handle = tokio::runtime::Handle::current();
                handle.block_on(async move {
                    agent
                        .driver
                        .commit(&agent.config.image_store_dir, &req.image_name, &req.image_id)
                        .await
                        .map(|p| p.display().to_string())
                        .map_err(|e| e.to_string())
                })
            })
            .await;
        Ok(TaskStatus::new(task_id, TaskState::Doing, None))
    }

    pub fn image_info(&self, image_name: &str, image_tag: &str) -> Result<ImageInfoResponse, AgentError> {
        let size = self.driver.image_info(&self.config.image_store_dir, image_name, image_tag)?;
        Ok(ImageInfoResponse { name: image_name.to_string(), id: image_tag.to_string(), size })
    }

    pub fn console_output(&self) -> Result<String, AgentError> {
        self.driver.read_file("/var/log/lxc/console.log").or_else(|_| Ok(Vec::new())).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Coarse status code for `GET /container/status`, built from the
    /// persisted lifecycle state rather than re-querying the backend, since
    /// the controller's own state machine is the source of truth between
    /// calls.
    pub async fn status(&self) -> StatusResponse {
        let slot = self.slot.lock().await;
        let Some(name) = &slot.name else {
            let code = if slot.image_name.is_none() { StatusCode::NoContainer } else { StatusCode::NoImage };
            return StatusResponse { code: code.code(), message: code.message("") };
        };
        let code = match slot.state {
            Some(ContainerState::Running) => StatusCode::Running,
            Some(ContainerState::Paused) => StatusCode::Frozen,
            Some(ContainerState::Created) | None => StatusCode::Stopped,
            Some(ContainerState::Absent) => StatusCode::NoContainer,
        };
        StatusResponse { code: code.code(), message: code.message(name) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_types::AgentConfig;

    async fn test_agent() -> Arc<Agent> {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::default();
        config.fake_execute = true;
        config.container_volume_link_dir = dir.path().join("by-volume-id");
        config.settings_path = dir.path().join("settings.json");
        config.lxc_path = dir.path().join("lxc");
        config.lxc_mount_dir = dir.path().join("mnt");
        config.sg_targets_dir = dir.path().join("sg");
        config.image_store_dir = dir.path().join("images");
        Arc::new(Agent::new(config).await.unwrap())
    }

    #[tokio::test]
    async fn status_before_create_is_no_container() {
        let agent = test_agent().await;
        let status = agent.status().await;
        assert_eq!(status.code, StatusCode::NoContainer.code());
    }

    #[tokio::test]
    async fn start_without_create_is_container_not_found() {
        let agent = test_agent().await;
        let result = agent.start(StartRequest::default()).await;
        assert!(matches!(result, Err(AgentError::ContainerNotFound)));
    }

    #[tokio::test]
    async fn create_then_status_reports_stopped() {
        let agent = test_agent().await;
        let req = CreateRequest {
            image_name: "alpine".to_string(),
            image_id: "img-1".to_string(),
            root_volume_id: None,
            network_info: Vec::new(),
            block_device_info: Default::default(),
            inject_files: Vec::new(),
            admin_password: None,
        };
        agent.clone().create(req).await.unwrap();
        for _ in 0..50 {
            if agent.slot.lock().await.name.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let status = agent.status().await;
        assert_eq!(status.code, StatusCode::Stopped.code());
    }
}
