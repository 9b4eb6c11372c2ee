// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Typed configuration surface for the agent, loaded once at startup from a
/// TOML file and overridable by CLI flags. Collapses the grounding source's
/// dynamic `oslo.config` `CONF.register_opts` registry into a single struct
/// with documented per-field defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub port: u16,
    pub container_volume_link_dir: PathBuf,
    pub volume_dd_blocksize: String,
    pub ovs_vsctl_timeout: u32,
    pub network_device_mtu: u32,
    pub vif_driver: String,
    pub sg_server_host: String,
    pub sg_server_port: u16,
    pub sg_targets_dir: PathBuf,
    pub fake_execute: bool,
    pub fatal_exception_format_errors: bool,

    // Ambient: logging, LXC paths, persisted settings.
    pub log_level: String,
    pub log_dir: PathBuf,
    pub lxc_path: PathBuf,
    pub lxc_mount_dir: PathBuf,
    pub lxc_template_script: PathBuf,
    pub settings_path: PathBuf,
    pub root_volume_link_name: String,
    pub image_store_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            port: 7127,
            container_volume_link_dir: PathBuf::from("/var/lib/wormhole/.by-volume-id"),
            volume_dd_blocksize: "1M".to_string(),
            ovs_vsctl_timeout: 120,
            network_device_mtu: 9000,
            vif_driver: "hybrid-ovs".to_string(),
            sg_server_host: "127.0.0.1".to_string(),
            sg_server_port: 9999,
            sg_targets_dir: PathBuf::from("/etc/tgt/storage-gateway.d"),
            fake_execute: false,
            fatal_exception_format_errors: false,
            log_level: "info".to_string(),
            log_dir: PathBuf::from("/var/log/wormhole"),
            lxc_path: PathBuf::from("/var/lib/lxc"),
            lxc_mount_dir: PathBuf::from("/lxc/"),
            lxc_template_script: PathBuf::from("/var/lib/wormhole/bin/lxc-general"),
            settings_path: PathBuf::from("/var/lib/wormhole/settings.json"),
            root_volume_link_name: "data-device-link".to_string(),
            image_store_dir: PathBuf::from("/var/lib/wormhole/images"),
        }
    }
}

impl AgentConfig {
    /// Load from a TOML file if it exists, falling back to defaults for
    /// every field the file doesn't set (and for every field when the file
    /// itself is absent).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(AgentConfig::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let cfg: AgentConfig = toml::from_str(&raw)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = AgentConfig::load(Path::new("/nonexistent/agent.toml")).unwrap();
        assert_eq!(cfg.port, 7127);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "port = 9000\n").unwrap();
        let cfg = AgentConfig::load(&path).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.ovs_vsctl_timeout, 120);
    }
}
