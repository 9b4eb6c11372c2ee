// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Config-snippet rendering: the `lxc.network.*` block for a single VIF,
//! grounded on the grounding source's `LXC_NET_CONFIG_TEMPLATE` /
//! `lxc_net_conf`.

use agent_types::Vif;

/// Renders the `net_<id11>.conf` snippet for `vif` bound to guest
/// interface `net_name` (`eth0`, `eth1`, ...). Only `eth0` gets an
/// `ipv4`/`ipv4.gateway` line, matching the grounding source's convention
/// that the primary interface carries the default route.
pub fn render_net_conf(net_name: &str, vif: &Vif) -> String {
    let id11 = vif.id_prefix();
    let mut conf = format!("## START {id11}\n");
    conf.push_str("# new network\n");
    conf.push_str("lxc.network.type = veth\n");
    conf.push_str(&format!("lxc.network.link = {}\n", vif.bridge_name()));
    conf.push_str(&format!("lxc.network.veth.pair = {}\n", vif.tap_name()));
    conf.push_str(&format!("lxc.network.name = {net_name}\n"));
    conf.push_str("lxc.network.flags = up\n");
    conf.push_str(&format!("lxc.network.hwaddr = {}\n", vif.address));
    conf.push_str(&format!("lxc.network.mtu = {}\n", vif.mtu));

    if net_name == "eth0" {
        if let Some(ip) = vif.network.find_fixed_ip() {
            conf.push_str(&format!("lxc.network.ipv4 = {ip}\n"));
        }
        if let Some(gateway) = vif.network.find_gateway() {
            conf.push_str(&format!("lxc.network.ipv4.gateway = {gateway}\n"));
        }
    }
    conf.push_str("## END\n\n");
    conf
}

/// One `lxc.cgroup.devices.allow` line per minor number, 16 of them
/// starting at `base_minor`, for the static-mode device.conf snippet.
pub fn render_static_device_conf(major: u64, base_minor: u64) -> String {
    let mut conf = String::new();
    for i in 0..16 {
        conf.push_str(&format!("lxc.cgroup.devices.allow = b {major}:{} rwm\n", base_minor + i));
    }
    conf
}

/// The autodev hook script body: replays `mknod` for every partition of
/// `device` found in `/proc/partitions`, so the container sees them at
/// start without the host ever mounting them.
pub fn render_autodev_hook(partitions: &[(String, u64, u64)]) -> String {
    let mut script = String::from("#!/bin/sh\n");
    for (name, maj, min) in partitions {
        script.push_str(&format!("mknod --mode=0660 $LXC_ROOTFS_MOUNT/dev/{name} b {maj} {min}\n"));
    }
    script
}

/// One `b maj:min rwm` line per minor number for the dynamic-mode cgroup
/// allow/deny sysfs node.
pub fn render_dynamic_device_lines(major: u64, base_minor: u64) -> String {
    let mut lines = String::new();
    for i in 1..16 {
        lines.push_str(&format!("b {major}:{} rwm\n", base_minor + i));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_types::Network;

    fn test_vif() -> Vif {
        Vif {
            id: "abcdefghijklmnop".to_string(),
            address: "aa:bb:cc:dd:ee:ff".to_string(),
            vif_type: "ovs".to_string(),
            mtu: 1300,
            network: Network::default(),
        }
    }

    #[test]
    fn eth0_snippet_includes_network_directives() {
        let conf = render_net_conf("eth0", &test_vif());
        assert!(conf.contains("lxc.network.type = veth"));
        assert!(conf.contains("lxc.network.link = qbrabcdefghijk"));
        assert!(conf.contains("lxc.network.mtu = 1300"));
    }

    #[test]
    fn non_primary_interface_has_no_ipv4_lines() {
        let conf = render_net_conf("eth1", &test_vif());
        assert!(!conf.contains("ipv4"));
    }

    #[test]
    fn static_device_conf_has_sixteen_lines() {
        let conf = render_static_device_conf(8, 16);
        assert_eq!(conf.lines().count(), 16);
        assert!(conf.contains("b 8:16 rwm"));
        assert!(conf.contains("b 8:31 rwm"));
    }
}
