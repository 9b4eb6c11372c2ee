// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
use serde::{Deserialize, Serialize};

/// A virtual network interface descriptor handed to us by the orchestrator.
///
/// `id` is opaque; only its first 11 characters are meaningful to the agent,
/// as the naming prefix for every host-side artefact (`qbr<id11>`,
/// `qvm<id11>`, `tap<id11>`, `ns<id11>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vif {
    pub id: String,
    pub address: String,
    #[serde(rename = "type")]
    pub vif_type: String,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default)]
    pub network: Network,
}

fn default_mtu() -> u32 {
    1300
}

impl Vif {
    /// The naming prefix shared by every artefact this VIF owns.
    pub fn id_prefix(&self) -> &str {
        let end = self.id.char_indices().nth(11).map(|(i, _)| i).unwrap_or(self.id.len());
        &self.id[..end]
    }

    pub fn bridge_name(&self) -> String {
        format!("qbr{}", self.id_prefix())
    }

    pub fn ovs_port_name(&self) -> String {
        format!("qvm{}", self.id_prefix())
    }

    pub fn tap_name(&self) -> String {
        format!("tap{}", self.id_prefix())
    }

    pub fn ns_name(&self) -> String {
        format!("ns{}", self.id_prefix())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subnet {
    pub cidr: Option<String>,
    pub gateway: Option<Ip>,
    #[serde(default)]
    pub dns: Vec<Dns>,
    #[serde(default)]
    pub ips: Vec<Ip>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ip {
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dns {
    pub address: String,
}

impl Network {
    /// The first gateway address found across all subnets, if any.
    pub fn find_gateway(&self) -> Option<&str> {
        self.subnets.iter().find_map(|s| s.gateway.as_ref()).map(|ip| ip.address.as_str())
    }

    /// The first fixed IP address found across all subnets, if any.
    pub fn find_fixed_ip(&self) -> Option<&str> {
        self.subnets.iter().find_map(|s| s.ips.first()).map(|ip| ip.address.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_prefix_truncates_to_eleven_chars() {
        let vif = Vif {
            id: "abcdefghijklmnop".to_string(),
            address: "aa:bb:cc:dd:ee:ff".to_string(),
            vif_type: "ovs".to_string(),
            mtu: 1300,
            network: Network::default(),
        };
        assert_eq!(vif.id_prefix(), "abcdefghijk");
        assert_eq!(vif.bridge_name(), "qbrabcdefghijk");
        assert_eq!(vif.tap_name(), "tapabcdefghijk");
    }

    #[test]
    fn id_prefix_handles_short_ids() {
        let vif = Vif {
            id: "short".to_string(),
            address: "aa:bb:cc:dd:ee:ff".to_string(),
            vif_type: "ovs".to_string(),
            mtu: 1300,
            network: Network::default(),
        };
        assert_eq!(vif.id_prefix(), "short");
    }
}
