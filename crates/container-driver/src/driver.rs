// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C4: the container driver. A thin wrapper over the `lxc-*` command-line
//! tools, grounded almost line-for-line on the grounding source's
//! `LXCClient`.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use agent_types::{AgentError, Vif};
use async_trait::async_trait;
use slog::{debug, info};
use sys_util::command::{CommandRunner, ExecuteOptions};
use sys_util::sl;
use volume_map::VolumeBackend;

use crate::devnum::{major, minor};
use crate::paths::LxcPaths;
use crate::template::{render_autodev_hook, render_net_conf, render_static_device_conf};

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub status: String,
}

pub struct ContainerDriver {
    runner: CommandRunner,
    paths: LxcPaths,
    template_script: String,
}

impl ContainerDriver {
    pub fn new(runner: CommandRunner, paths: LxcPaths, template_script: String) -> Self {
        ContainerDriver { runner, paths, template_script }
    }

    pub async fn list(&self) -> Result<Vec<ContainerSummary>, AgentError> {
        let (stdout, _) = self
            .runner
            .execute_root(&["lxc-ls", "-f", "-F", "NAME,STATE"])
            .await
            .map_err(to_backend_failure)?;
        let mut out = Vec::new();
        for line in stdout.lines().skip(1) {
            let mut cols = line.split_whitespace();
            let (Some(name), Some(status)) = (cols.next(), cols.next()) else { continue };
            out.push(ContainerSummary { id: name.to_string(), name: name.to_string(), status: status.to_string() });
        }
        Ok(out)
    }

    pub async fn create(&self, name: &str) -> Result<(), AgentError> {
        self.runner
            .execute_root(&["lxc-create", "-n", name, "-t", &self.template_script])
            .await
            .map_err(to_backend_failure)?;
        Ok(())
    }

    pub async fn destroy(&self, name: &str) -> Result<(), AgentError> {
        self.runner.execute_root(&["lxc-destroy", "-f", "-n", name]).await.map_err(to_backend_failure)?;
        Ok(())
    }

    /// Returns at minimum `{State.Pid}`, per `lxc-info -p -n <id>`'s last
    /// whitespace-separated token.
    pub async fn inspect(&self, id: &str) -> Result<Option<u32>, AgentError> {
        let (stdout, _) = self.runner.execute_root(&["lxc-info", "-p", "-n", id]).await.map_err(to_backend_failure)?;
        Ok(stdout.split_whitespace().last().and_then(|pid| pid.parse().ok()))
    }

    pub async fn start(&self, name: &str, vifs: &[Vif], timeout_secs: u32) -> Result<(), AgentError> {
        self.add_interfaces(name, vifs, false, &[]).await?;
        self.runner
            .execute_root(&["lxc-start", "-n", name, "-d", "-l", "DEBUG"])
            .await
            .map_err(to_backend_failure)?;
        let timeout = timeout_secs.to_string();
        self.runner
            .execute_root(&["lxc-wait", "-n", name, "-s", "RUNNING", "-t", timeout.as_str()])
            .await
            .map_err(to_backend_failure)?;
        Ok(())
    }

    /// Refuses (returning an informational string, not an error) if the
    /// container isn't currently `RUNNING`.
    pub async fn stop(&self, name: &str, timeout_secs: u32) -> Result<Option<String>, AgentError> {
        let containers = self.list().await?;
        let status = containers.iter().find(|c| c.name == name).map(|c| c.status.as_str()).unwrap_or("");
        if status != "RUNNING" {
            return Ok(Some(format!("Container {name} is {status}, can't stop it")));
        }
        let timeout = timeout_secs.to_string();
        self.runner.execute_root(&["lxc-stop", "-n", name, "-t", timeout.as_str()]).await.map_err(to_backend_failure)?;
        Ok(None)
    }

    pub async fn pause(&self, name: &str) -> Result<(), AgentError> {
        self.runner.execute_root(&["lxc-freeze", "-n", name]).await.map_err(to_backend_failure)?;
        Ok(())
    }

    pub async fn unpause(&self, name: &str) -> Result<(), AgentError> {
        self.runner.execute_root(&["lxc-unfreeze", "-n", name]).await.map_err(to_backend_failure)?;
        Ok(())
    }

    pub async fn exec(&self, name: &str, argv: &[&str]) -> Result<String, AgentError> {
        let mut full = vec!["lxc-attach", "-n", name, "--"];
        full.extend_from_slice(argv);
        let (stdout, _) = self
            .runner
            .execute(&full, ExecuteOptions::root().with_attempts(1))
            .await
            .map_err(to_backend_failure)?;
        Ok(stdout)
    }

    pub fn inject_file(&self, path: &str, content: &[u8]) -> Result<(), AgentError> {
        let host_path = self.paths.host_path(path);
        let parent = host_path.parent().unwrap_or_else(|| Path::new("/"));
        if !parent.is_dir() {
            return Err(AgentError::DirNotFound { dir: parent.display().to_string() });
        }
        std::fs::write(&host_path, content)
            .map_err(|e| AgentError::InjectFailed { path: path.to_string(), reason: e.to_string() })
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, AgentError> {
        let host_path = self.paths.host_path(path);
        std::fs::read(&host_path).map_err(|e| AgentError::InjectFailed { path: path.to_string(), reason: e.to_string() })
    }

    pub async fn add_interfaces(
        &self,
        name: &str,
        vifs: &[Vif],
        append: bool,
        net_names: &[String],
    ) -> Result<(), AgentError> {
        if !append {
            let conf_dir = self.paths.conf_dir(name);
            if let Ok(entries) = std::fs::read_dir(&conf_dir) {
                for entry in entries.flatten() {
                    let file_name = entry.file_name();
                    let file_name = file_name.to_string_lossy();
                    if file_name.starts_with("net_") && file_name.ends_with(".conf") {
                        let _ = std::fs::remove_file(entry.path());
                        debug!(sl!(), "removed net conf"; "file" => file_name.to_string());
                    }
                }
            }
        }

        let fallback: Vec<String> = (0..vifs.len()).map(|i| format!("eth{i}")).collect();
        let names = if net_names.is_empty() { fallback.as_slice() } else { net_names };

        for (net_name, vif) in names.iter().zip(vifs.iter()) {
            let conf = render_net_conf(net_name, vif);
            let conf_path = self.paths.net_conf_file(name, vif.id_prefix());
            std::fs::create_dir_all(self.paths.conf_dir(name))
                .and_then(|_| std::fs::write(&conf_path, conf))
                .map_err(|e| AgentError::Unexpected(anyhow::anyhow!("writing {}: {e}", conf_path.display())))?;
        }
        Ok(())
    }

    pub async fn remove_interfaces(&self, name: &str, vifs: &[Vif]) -> Result<(), AgentError> {
        for vif in vifs {
            let _ = self.runner.execute(&["ip", "link", "del", vif.tap_name().as_str()], ExecuteOptions::root()).await;
            let conf_path = self.paths.net_conf_file(name, vif.id_prefix());
            if conf_path.is_file() {
                let _ = std::fs::remove_file(&conf_path);
            }
        }
        Ok(())
    }

    async fn dynamic_attach_or_detach(&self, name: &str, device: &str, maj: u64, min: u64, attach: bool) -> Result<(), AgentError> {
        let action = if attach { "add" } else { "del" };
        self.runner.execute_root(&["lxc-device", "-n", name, action, device]).await.map_err(to_backend_failure)?;

        let allow_path = self.paths.cgroup_devices_file(name, attach);
        let lines = crate::template::render_dynamic_device_lines(maj, min);
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .open(&allow_path)
            .map_err(|e| AgentError::Unexpected(anyhow::anyhow!("opening {}: {e}", allow_path.display())))?;
        f.write_all(lines.as_bytes())
            .map_err(|e| AgentError::Unexpected(anyhow::anyhow!("writing {}: {e}", allow_path.display())))?;
        Ok(())
    }

    /// `mount_device` is accepted but unused, mirroring the grounding
    /// source's LXC backend (it ignores the guest-visible device name
    /// entirely; only VM-style backends care).
    /// Tars up the rootfs currently bind-mounted at [`LxcPaths::mount_dir`]
    /// into `<image_store_dir>/<image_name>-<image_tag>.tar.gz`. Local-only:
    /// nothing is pushed to a registry.
    pub async fn commit(&self, image_store_dir: &Path, image_name: &str, image_tag: &str) -> Result<PathBuf, AgentError> {
        std::fs::create_dir_all(image_store_dir)
            .map_err(|e| AgentError::Unexpected(anyhow::anyhow!("creating {}: {e}", image_store_dir.display())))?;
        let archive_path = image_store_dir.join(format!("{image_name}-{image_tag}.tar.gz"));
        self.runner
            .execute_root(&[
                "tar",
                "-czf",
                archive_path.to_str().unwrap_or_default(),
                "-C",
                self.paths.mount_dir.to_str().unwrap_or_default(),
                ".",
            ])
            .await
            .map_err(to_backend_failure)?;
        info!(sl!(), "committed image"; "path" => archive_path.display().to_string(), "image_name" => image_name, "image_tag" => image_tag);
        Ok(archive_path)
    }

    /// `{name,id,size}` for an already-committed image, per `/container/image-info`.
    pub fn image_info(&self, image_store_dir: &Path, image_name: &str, image_tag: &str) -> Result<u64, AgentError> {
        let archive_path = image_store_dir.join(format!("{image_name}-{image_tag}.tar.gz"));
        let meta = std::fs::metadata(&archive_path)
            .map_err(|_| AgentError::ImageNotFound { id: format!("{image_name}:{image_tag}") })?;
        Ok(meta.len())
    }

    async fn attach_volume_impl(
        &self,
        name: &str,
        device: &str,
        _mount_device: &str,
        static_mode: bool,
    ) -> Result<(), AgentError> {
        let meta = std::fs::metadata(device)
            .map_err(|e| AgentError::InvalidInput { reason: format!("stat {device}: {e}") })?;
        if !is_block_device(&meta) {
            return Err(AgentError::InvalidInput { reason: format!("\"{device}\" is not a block device") });
        }
        let rdev = meta.rdev();
        let (maj, min) = (major(rdev), minor(rdev));

        if !static_mode {
            return self.dynamic_attach_or_detach(name, device, maj, min, true).await;
        }

        let conf_path = self.paths.device_conf_file(name, device);
        std::fs::create_dir_all(self.paths.conf_dir(name))
            .and_then(|_| std::fs::write(&conf_path, render_static_device_conf(maj, min)))
            .map_err(|e| AgentError::Unexpected(anyhow::anyhow!("writing {}: {e}", conf_path.display())))?;
        info!(sl!(), "new device config"; "path" => conf_path.display().to_string(), "device" => device);

        let device_basename = device.rsplit('/').next().unwrap_or(device);
        let mut partitions = Vec::new();
        if let Ok(contents) = std::fs::read_to_string("/proc/partitions") {
            for line in contents.lines() {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if let Some(last) = fields.last() {
                    if last.starts_with(device_basename) && fields.len() >= 4 {
                        partitions.push((last.to_string(), fields[0].parse().unwrap_or(0), fields[1].parse().unwrap_or(0)));
                    }
                }
            }
        }
        let hook_path = self.paths.autodev_hook_script(name, device);
        std::fs::create_dir_all(self.paths.hook_dir(name))
            .and_then(|_| std::fs::write(&hook_path, render_autodev_hook(&partitions)))
            .map_err(|e| AgentError::Unexpected(anyhow::anyhow!("writing {}: {e}", hook_path.display())))?;
        Ok(())
    }

    async fn detach_volume_impl(
        &self,
        name: &str,
        device: &str,
        _mount_device: &str,
        static_mode: bool,
    ) -> Result<(), AgentError> {
        let meta = std::fs::metadata(device)
            .map_err(|e| AgentError::InvalidInput { reason: format!("stat {device}: {e}") })?;
        if !is_block_device(&meta) {
            return Err(AgentError::InvalidInput { reason: format!("\"{device}\" is not a block device") });
        }
        if !static_mode {
            let rdev = meta.rdev();
            self.dynamic_attach_or_detach(name, device, major(rdev), minor(rdev), false).await?;
        }
        for path in [self.paths.device_conf_file(name, device), self.paths.autodev_hook_script(name, device)] {
            if path.is_file() {
                let _ = std::fs::remove_file(&path);
                info!(sl!(), "removed device artefact"; "path" => path.display().to_string(), "device" => device);
            }
        }
        Ok(())
    }
}

fn is_block_device(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    meta.file_type().is_block_device()
}

fn to_backend_failure(e: sys_util::command::CommandFailure) -> AgentError {
    AgentError::BackendFailure { argv: e.argv, exit_code: e.exit_code, stdout: e.stdout, stderr: e.stderr }
}

/// Binds a [`ContainerDriver`] to one container so it can satisfy
/// `volume-map`'s [`VolumeBackend`] trait, which has no room for a
/// container id: the volume mapper is instantiated per running container,
/// so this adapter closes over the name it was built for.
pub struct ContainerVolumeBackend {
    driver: std::sync::Arc<ContainerDriver>,
    container_name: String,
}

impl ContainerVolumeBackend {
    pub fn new(driver: std::sync::Arc<ContainerDriver>, container_name: String) -> Self {
        ContainerVolumeBackend { driver, container_name }
    }
}

#[async_trait]
impl VolumeBackend for ContainerVolumeBackend {
    async fn attach_volume(&self, device: &str, mount_device: &str, static_mode: bool) -> anyhow::Result<()> {
        self.driver
            .attach_volume_impl(&self.container_name, device, mount_device, static_mode)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))
    }

    async fn detach_volume(&self, device: &str, mount_device: &str, static_mode: bool) -> anyhow::Result<()> {
        self.driver
            .detach_volume_impl(&self.container_name, device, mount_device, static_mode)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(dir: &Path) -> ContainerDriver {
        ContainerDriver::new(
            CommandRunner::new(true),
            LxcPaths::new(dir.join("lxc"), dir.join("mnt")),
            "/var/lib/wormhole/bin/lxc-general".to_string(),
        )
    }

    #[tokio::test]
    async fn list_parses_name_state_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let d = driver(dir.path());
        // fake_execute returns empty stdout, so the listing is simply empty.
        let containers = d.list().await.unwrap();
        assert!(containers.is_empty());
    }

    #[test]
    fn inject_file_fails_without_mounted_rootfs() {
        let dir = tempfile::tempdir().unwrap();
        let d = driver(dir.path());
        let result = d.inject_file("/etc/passwd", b"root:x:0:0\n");
        assert!(matches!(result, Err(AgentError::DirNotFound { .. })));
    }

    #[test]
    fn inject_and_read_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("mnt/etc")).unwrap();
        let d = driver(dir.path());
        d.inject_file("/etc/motd", b"hello\n").unwrap();
        assert_eq!(d.read_file("/etc/motd").unwrap(), b"hello\n");
    }
}
