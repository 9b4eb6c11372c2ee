// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Composition root: owns every long-lived component and the single mutex
//! guarding the container's mutable lifecycle state, per the concurrency
//! model (one `tokio::sync::Mutex` around the agent's mutable state,
//! rather than per-field locks).

use std::path::PathBuf;
use std::sync::Arc;

use agent_types::{AgentConfig, ContainerState, PersistedSettings};
use container_driver::{ContainerDriver, ContainerVolumeBackend, LxcPaths};
use net_plumb::{LinuxNet, VifDriver};
use sg_gateway::SgGateway;
use sys_util::command::CommandRunner;
use task_manager::TaskManager;
use tokio::sync::Mutex;
use volume_map::{VolumeBackend, VolumeController, VolumeMapper};

/// The one container this host manages, plus whatever the last `start`
/// told us about its network and volume manifests. `name` is `None` until
/// `create` succeeds.
#[derive(Debug, Default)]
pub struct ContainerSlot {
    pub name: Option<String>,
    pub state: Option<ContainerState>,
    pub settings: PersistedSettings,
    pub image_name: Option<String>,
    pub image_id: Option<String>,
}

pub struct Agent {
    pub config: AgentConfig,
    pub runner: CommandRunner,
    pub driver: Arc<ContainerDriver>,
    pub vif_driver: Arc<VifDriver>,
    pub mapper: Arc<VolumeMapper>,
    pub volumes: Arc<VolumeController>,
    pub sg: Arc<SgGateway>,
    pub tasks: Arc<TaskManager>,
    pub settings_path: PathBuf,
    pub slot: Mutex<ContainerSlot>,
    pub active_backend: Arc<ActiveContainerBackend>,
}

impl Agent {
    pub async fn new(config: AgentConfig) -> anyhow::Result<Self> {
        let runner = CommandRunner::new(config.fake_execute);

        let lxc_paths = LxcPaths::new(config.lxc_path.clone(), config.lxc_mount_dir.clone());
        let driver = Arc::new(ContainerDriver::new(
            runner.clone(),
            lxc_paths,
            config.lxc_template_script.display().to_string(),
        ));

        let linux_net = LinuxNet::new(runner.clone(), config.ovs_vsctl_timeout, config.network_device_mtu);
        let vif_driver = Arc::new(VifDriver::new(linux_net));

        // The volume mapper's backend is bound to whatever container
        // currently exists; see [`ActiveContainerBackend`].
        let active_backend = Arc::new(ActiveContainerBackend::new(Arc::clone(&driver)));
        let mapper = Arc::new(VolumeMapper::new(
            config.container_volume_link_dir.clone(),
            config.root_volume_link_name.clone(),
            runner.clone(),
            Arc::clone(&active_backend) as Arc<dyn VolumeBackend>,
        ));
        mapper.setup().await?;

        let tasks = Arc::new(TaskManager::new());
        let volumes = Arc::new(VolumeController::new(
            Arc::clone(&mapper),
            runner.clone(),
            Arc::clone(&tasks),
            config.volume_dd_blocksize.clone(),
        ));

        let sg = Arc::new(SgGateway::new(
            runner.clone(),
            config.sg_targets_dir.clone(),
            config.sg_server_host.clone(),
            config.sg_server_port,
        ));

        let settings_path = config.settings_path.clone();
        let settings = persist::load(&settings_path).unwrap_or_default();

        let slot = Mutex::new(ContainerSlot { name: None, state: None, settings, image_name: None, image_id: None });

        Ok(Agent { config, runner, driver, vif_driver, mapper, volumes, sg, tasks, settings_path, slot, active_backend })
    }

    pub async fn persist_settings(&self, settings: &PersistedSettings) -> anyhow::Result<()> {
        persist::save(&self.settings_path, settings)
    }
}

/// A [`volume_map::VolumeBackend`] bound to whichever container currently
/// exists, rather than to one fixed at construction time: the mapper is
/// built once at startup, before any container has been created.
pub struct ActiveContainerBackend {
    driver: Arc<ContainerDriver>,
    current: std::sync::Mutex<Option<String>>,
}

impl ActiveContainerBackend {
    pub fn new(driver: Arc<ContainerDriver>) -> Self {
        ActiveContainerBackend { driver, current: std::sync::Mutex::new(None) }
    }

    pub fn set_container(&self, name: Option<String>) {
        *self.current.lock().unwrap() = name;
    }

    fn bound(&self, driver: &Arc<ContainerDriver>) -> Option<ContainerVolumeBackend> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .map(|name| ContainerVolumeBackend::new(Arc::clone(driver), name))
    }
}

#[async_trait::async_trait]
impl volume_map::VolumeBackend for ActiveContainerBackend {
    async fn attach_volume(&self, device: &str, mount_device: &str, static_mode: bool) -> anyhow::Result<()> {
        match self.bound(&self.driver) {
            Some(backend) => backend.attach_volume(device, mount_device, static_mode).await,
            None => Ok(()),
        }
    }

    async fn detach_volume(&self, device: &str, mount_device: &str, static_mode: bool) -> anyhow::Result<()> {
        match self.bound(&self.driver) {
            Some(backend) => backend.detach_volume(device, mount_device, static_mode).await,
            None => Ok(()),
        }
    }
}
