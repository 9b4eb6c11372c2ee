// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Thin wrappers around the host networking tools: `ip`, `brctl`,
//! `ovs-vsctl`. Grounded on the grounding source's `linux_net.py`: every
//! function here is a near-literal translation of one of its module-level
//! helpers, routed through the command runner instead of a raw subprocess
//! call.

use std::path::Path;

use sys_util::command::{CommandRunner, ExecuteOptions};
use sys_util::sl;

#[derive(Debug, Clone)]
pub struct LinuxNet {
    runner: CommandRunner,
    ovs_vsctl_timeout: u32,
    default_mtu: u32,
}

impl LinuxNet {
    pub fn new(runner: CommandRunner, ovs_vsctl_timeout: u32, default_mtu: u32) -> Self {
        LinuxNet { runner, ovs_vsctl_timeout, default_mtu }
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn device_exists(&self, dev: &str) -> bool {
        Path::new("/sys/class/net").join(dev).exists()
    }

    pub async fn set_device_mtu(&self, dev: &str, mtu: Option<u32>) -> anyhow::Result<()> {
        let mtu = mtu.unwrap_or(self.default_mtu).to_string();
        self.runner
            .execute(
                &["ip", "link", "set", dev, "mtu", mtu.as_str()],
                ExecuteOptions::root().with_accepted_exit_codes(&[0, 2, 254]),
            )
            .await?;
        Ok(())
    }

    pub async fn set_link_up(&self, dev: &str) -> anyhow::Result<()> {
        self.runner.execute(&["ip", "link", "set", dev, "up"], ExecuteOptions::root()).await?;
        Ok(())
    }

    pub async fn set_link_down(&self, dev: &str) -> anyhow::Result<()> {
        self.runner.execute(&["ip", "link", "set", dev, "down"], ExecuteOptions::root()).await?;
        Ok(())
    }

    pub async fn delete_net_dev(&self, dev: &str) -> anyhow::Result<()> {
        if !self.device_exists(dev) {
            return Ok(());
        }
        self.runner
            .execute(
                &["ip", "link", "delete", dev],
                ExecuteOptions::root().with_accepted_exit_codes(&[0, 2, 254]),
            )
            .await?;
        debug!(sl!(), "net device removed"; "dev" => dev);
        Ok(())
    }

    pub async fn create_veth_pair(&self, dev1: &str, dev2: &str) -> anyhow::Result<()> {
        self.delete_net_dev(dev1).await?;
        self.delete_net_dev(dev2).await?;
        self.runner
            .execute(
                &["ip", "link", "add", dev1, "type", "veth", "peer", "name", dev2],
                ExecuteOptions::root(),
            )
            .await?;
        for dev in [dev1, dev2] {
            self.set_link_up(dev).await?;
            self.runner
                .execute(&["ip", "link", "set", dev, "promisc", "on"], ExecuteOptions::root())
                .await?;
            self.set_device_mtu(dev, None).await?;
        }
        Ok(())
    }

    pub async fn bridge_add(&self, name: &str) -> anyhow::Result<()> {
        self.runner.execute(&["brctl", "addbr", name], ExecuteOptions::root()).await?;
        self.runner.execute(&["brctl", "setfd", name, "0"], ExecuteOptions::root()).await?;
        self.runner.execute(&["brctl", "stp", name, "off"], ExecuteOptions::root()).await?;
        let snooping = format!("/sys/class/net/{name}/bridge/multicast_snooping");
        self.runner
            .execute(
                &["tee", snooping.as_str()],
                ExecuteOptions::root().with_stdin(b"0".to_vec()).with_accepted_exit_codes(&[0, 1]),
            )
            .await?;
        Ok(())
    }

    pub async fn bridge_del(&self, name: &str) -> anyhow::Result<()> {
        if self.device_exists(name) {
            self.runner.execute(&["brctl", "delbr", name], ExecuteOptions::root()).await?;
        }
        Ok(())
    }

    pub async fn bridge_addif(&self, bridge: &str, dev: &str) -> anyhow::Result<()> {
        self.runner.execute(&["brctl", "addif", bridge, dev], ExecuteOptions::root()).await?;
        Ok(())
    }

    pub async fn bridge_delif(&self, bridge: &str, dev: &str) -> anyhow::Result<()> {
        self.runner
            .execute(
                &["brctl", "delif", bridge, dev],
                ExecuteOptions::root().with_accepted_exit_codes(&[0, 1]),
            )
            .await?;
        Ok(())
    }

    async fn ovs_vsctl(&self, args: &[&str]) -> anyhow::Result<(String, String)> {
        let timeout_arg = format!("--timeout={}", self.ovs_vsctl_timeout);
        let mut full: Vec<&str> = vec!["ovs-vsctl", timeout_arg.as_str()];
        full.extend_from_slice(args);
        Ok(self.runner.execute(&full, ExecuteOptions::root()).await?)
    }

    pub async fn create_ovs_internal_port(
        &self,
        bridge: &str,
        dev: &str,
        iface_id: &str,
        mac: &str,
        instance_id: &str,
    ) -> anyhow::Result<()> {
        self.delete_ovs_vif_port(bridge, dev).await?;
        let iface_id_attr = format!("external-ids:iface-id={iface_id}");
        let status_attr = "external-ids:iface-status=active".to_string();
        let mac_attr = format!("external-ids:attached-mac={mac}");
        let vm_attr = format!("external-ids:vm-uuid={instance_id}");
        self.ovs_vsctl(&[
            "--",
            "add-port",
            bridge,
            dev,
            "--",
            "set",
            "Interface",
            dev,
            iface_id_attr.as_str(),
            status_attr.as_str(),
            mac_attr.as_str(),
            vm_attr.as_str(),
            "type=internal",
        ])
        .await?;
        self.set_device_mtu(dev, None).await?;
        Ok(())
    }

    pub async fn delete_ovs_vif_port(&self, bridge: &str, dev: &str) -> anyhow::Result<()> {
        let _ = self.ovs_vsctl(&["--", "--if-exists", "del-port", bridge, dev]).await;
        self.delete_net_dev(dev).await
    }
}
