// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Filesystem layout for a single LXC container's config and rootfs
//! mount point, grounded on the grounding source's `lxc_client.lxc_root` /
//! `lxc_conf_dir` / `lxc_hook_dir` helpers.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct LxcPaths {
    pub lxc_path: PathBuf,
    pub mount_dir: PathBuf,
}

impl LxcPaths {
    pub fn new(lxc_path: impl Into<PathBuf>, mount_dir: impl Into<PathBuf>) -> Self {
        LxcPaths { lxc_path: lxc_path.into(), mount_dir: mount_dir.into() }
    }

    pub fn root(&self, name: &str) -> PathBuf {
        self.lxc_path.join(name)
    }

    pub fn conf_dir(&self, name: &str) -> PathBuf {
        self.root(name).join("conf.d")
    }

    pub fn hook_dir(&self, name: &str) -> PathBuf {
        self.root(name).join("hooks")
    }

    pub fn device_conf_file(&self, name: &str, device: &str) -> PathBuf {
        let device_name = basename(device);
        self.conf_dir(name).join(format!("dev_{device_name}.conf"))
    }

    pub fn net_conf_file(&self, name: &str, vif: &str) -> PathBuf {
        self.conf_dir(name).join(format!("net_{vif}.conf"))
    }

    pub fn autodev_hook_script(&self, name: &str, device: &str) -> PathBuf {
        let device_name = basename(device);
        self.hook_dir(name).join(format!("autodev_{device_name}.sh"))
    }

    pub fn cgroup_devices_file(&self, name: &str, allow: bool) -> PathBuf {
        let kind = if allow { "allow" } else { "deny" };
        PathBuf::from(format!("/sys/fs/cgroup/devices/lxc/{name}/devices.{kind}"))
    }

    /// Maps a container-relative path to its host-side location under the
    /// rootfs mount directory.
    pub fn host_path(&self, relative: &str) -> PathBuf {
        self.mount_dir.join(relative.trim_start_matches('/'))
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conf_paths_follow_naming_convention() {
        let paths = LxcPaths::new("/var/lib/lxc", "/lxc/");
        assert_eq!(paths.device_conf_file("c1", "/dev/sdb"), PathBuf::from("/var/lib/lxc/c1/conf.d/dev_sdb.conf"));
        assert_eq!(paths.net_conf_file("c1", "abc"), PathBuf::from("/var/lib/lxc/c1/conf.d/net_abc.conf"));
    }

    #[test]
    fn host_path_strips_leading_slash() {
        let paths = LxcPaths::new("/var/lib/lxc", "/lxc/");
        assert_eq!(paths.host_path("/etc/passwd"), PathBuf::from("/lxc/etc/passwd"));
    }
}
