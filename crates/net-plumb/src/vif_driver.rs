// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C3: the network plumber. Builds and tears down the hybrid
//! bridge/OVS/veth stack for a single VIF and attaches its container-side
//! end into a container's network namespace.
//!
//! Grounded on the grounding source's `GenericVIFDriver` (`plug_ovs_hybrid`,
//! `unplug_ovs_hybrid`, `attach`): same artefact names, same step order, same
//! undo-on-failure behaviour, reimplemented with an explicit `UndoStack`
//! instead of a context-manager-style `UndoManager`.

use agent_types::{AgentError, Vif};

use crate::linux_net::LinuxNet;
use crate::undo::UndoStack;

/// Name of the OVS integration bridge every VIF's internal port attaches
/// to. Fixed, as in the grounding source (`get_bridge_name` always returns
/// `"br-int"`).
pub const INTEGRATION_BRIDGE: &str = "br-int";

#[derive(Debug, Clone)]
pub struct VifDriver {
    net: LinuxNet,
}

impl VifDriver {
    pub fn new(net: LinuxNet) -> Self {
        VifDriver { net }
    }

    /// Idempotent: if the veth host-side device already exists, this VIF is
    /// already plugged and there is nothing to do.
    pub async fn plug(&self, vif: &Vif, instance: &str) -> Result<(), AgentError> {
        let tap_name = vif.tap_name();
        if self.net.device_exists(&tap_name) {
            return Ok(());
        }

        let br_name = vif.bridge_name();
        let vm_port_name = vif.ovs_port_name();
        let mut undo = UndoStack::new();

        let result: anyhow::Result<()> = async {
            if !self.net.device_exists(&br_name) {
                self.net.bridge_add(&br_name).await?;
                let br_name_undo = br_name.clone();
                let net = self.net.clone();
                undo.push(move || async move {
                    let _ = net.bridge_del(&br_name_undo).await;
                });
            }

            self.net
                .create_ovs_internal_port(
                    INTEGRATION_BRIDGE,
                    vm_port_name.as_str(),
                    vif.id.as_str(),
                    vif.address.as_str(),
                    instance,
                )
                .await?;
            {
                let vm_port_undo = vm_port_name.clone();
                let net = self.net.clone();
                undo.push(move || async move {
                    let _ = net.delete_ovs_vif_port(INTEGRATION_BRIDGE, &vm_port_undo).await;
                });
            }

            self.net.set_link_up(INTEGRATION_BRIDGE).await?;
            self.net.set_link_up(&vm_port_name).await?;
            self.net.set_link_up(&br_name).await?;
            self.net.bridge_addif(&br_name, &vm_port_name).await?;

            Ok(())
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                undo.rollback().await;
                Err(AgentError::BackendFailure {
                    argv: vec!["plug".to_string(), vif.id.clone()],
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
        }
    }

    pub async fn unplug(&self, vif: &Vif) -> Result<(), AgentError> {
        let br_name = vif.bridge_name();
        let vm_port_name = vif.ovs_port_name();

        if self.net.device_exists(&br_name) {
            let _ = self.net.bridge_delif(&br_name, &vm_port_name).await;
            let _ = self.net.set_link_down(&br_name).await;
            let _ = self.net.bridge_del(&br_name).await;
        }
        let _ = self.net.delete_ovs_vif_port(INTEGRATION_BRIDGE, &vm_port_name).await;
        Ok(())
    }

    /// Creates the veth pair, moves its container-side end into the
    /// container's netns (already bind-mounted at `/var/run/netns/<container_id>`
    /// by [`crate::netns`]), renames it, and configures L3 inside.
    pub async fn attach(
        &self,
        vif: &Vif,
        container_id: &str,
        new_remote_name: &str,
    ) -> Result<(), AgentError> {
        self.attach_inner(vif, container_id, new_remote_name).await.map_err(|e| {
            AgentError::BackendFailure {
                argv: vec!["attach".to_string(), vif.id.clone()],
                exit_code: None,
                stdout: String::new(),
                stderr: e.to_string(),
            }
        })
    }

    async fn attach_inner(
        &self,
        vif: &Vif,
        container_id: &str,
        new_remote_name: &str,
    ) -> anyhow::Result<()> {
        let tap_name = vif.tap_name();
        let ns_name = vif.ns_name();
        let br_name = vif.bridge_name();

        self.net.delete_net_dev(&tap_name).await?;
        self.net.create_veth_pair(&tap_name, &ns_name).await?;
        self.net.bridge_addif(&br_name, &tap_name).await?;
        self.net.set_link_up(&tap_name).await?;

        let runner = self.net.runner();
        let ns_name = ns_name.as_str();

        runner.execute_root(&["ip", "link", "set", ns_name, "netns", container_id]).await?;
        runner
            .execute_root(&[
                "ip", "netns", "exec", container_id, "ip", "link", "set", "dev", ns_name, "name",
                new_remote_name,
            ])
            .await?;
        runner
            .execute_root(&[
                "ip", "netns", "exec", container_id, "ip", "link", "set", new_remote_name, "address",
                vif.address.as_str(),
            ])
            .await?;

        if let Some(ip) = vif.network.find_fixed_ip() {
            runner
                .execute_root(&[
                    "ip", "netns", "exec", container_id, "ip", "addr", "add", ip, "dev", new_remote_name,
                ])
                .await?;
        }

        runner
            .execute_root(&["ip", "netns", "exec", container_id, "ip", "link", "set", new_remote_name, "up"])
            .await?;

        let mtu = vif.mtu.to_string();
        runner
            .execute_root(&[
                "ip", "netns", "exec", container_id, "ip", "link", "set", new_remote_name, "mtu", mtu.as_str(),
            ])
            .await?;

        if let Some(gateway) = vif.network.find_gateway() {
            runner
                .execute_root(&[
                    "ip", "netns", "exec", container_id, "ip", "route", "replace", "default", "via",
                    gateway, "dev", new_remote_name,
                ])
                .await?;
        }

        runner
            .execute_root(&[
                "ip", "netns", "exec", container_id, "ethtool", "--offload", new_remote_name, "tso", "off",
            ])
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_types::Network;
    use sys_util::command::CommandRunner;

    fn test_vif() -> Vif {
        Vif {
            id: "abcdefghijklmnop".to_string(),
            address: "aa:bb:cc:dd:ee:ff".to_string(),
            vif_type: "ovs".to_string(),
            mtu: 1300,
            network: Network::default(),
        }
    }

    #[tokio::test]
    async fn plug_succeeds_end_to_end_with_fake_execute() {
        let net = LinuxNet::new(CommandRunner::new(true), 120, 9000);
        let driver = VifDriver::new(net);
        let vif = test_vif();
        let result = driver.plug(&vif, "container-1").await;
        assert!(result.is_ok());
    }
}
