// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C2: the volume mapper. Owns the stable `volume_id ↔ /dev/xxx` binding,
//! persisted as a directory of symlinks, and reconciles it against a
//! desired block-device-mapping manifest on every `start`/`create`.
//!
//! Grounded on the grounding source's `volumes.py` (`_get_device`,
//! `volume_link_path`) for the symlink-directory model, and on
//! `wormhole/container.py`'s block-device reconciliation for `update_bdm`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_types::{AgentError, BlockDeviceInfo};
use regex::Regex;
use slog::warn;
use sys_util::command::CommandRunner;
use sys_util::sl;

use crate::backend::VolumeBackend;

const NONE_MOUNT_POINT: &str = "none";

#[derive(Debug, Clone)]
pub struct HostDevice {
    pub name: String,
    pub size_gb: u64,
}

#[derive(Default)]
struct State {
    /// `volume_id -> /dev/xxx`
    volumes: HashMap<String, String>,
    /// `/dev/xxx -> mount_device` (the guest-visible device name, or `"none"`)
    mounts: HashMap<String, String>,
    root_device: Option<String>,
}

pub struct VolumeMapper {
    link_dir: PathBuf,
    root_link_name: String,
    runner: CommandRunner,
    backend: Arc<dyn VolumeBackend>,
    state: tokio::sync::Mutex<State>,
}

impl VolumeMapper {
    pub fn new(
        link_dir: PathBuf,
        root_link_name: String,
        runner: CommandRunner,
        backend: Arc<dyn VolumeBackend>,
    ) -> Self {
        VolumeMapper { link_dir, root_link_name, runner, backend, state: Default::default() }
    }

    /// Scans the link directory at startup, populating the in-memory map
    /// from whatever symlinks already exist. Never fails: a missing or
    /// unreadable directory just yields an empty map.
    pub async fn setup(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.link_dir).ok();
        let mut state = self.state.lock().await;
        let entries = match std::fs::read_dir(&self.link_dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(sl!(), "could not scan volume link dir"; "dir" => self.link_dir.display().to_string(), "error" => %e);
                return Ok(());
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(target) = std::fs::read_link(&path) else { continue };
            let Some(target_str) = target.to_str() else { continue };
            if !target_str.starts_with("/dev/") {
                continue;
            }
            let Some(volume_id) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if volume_id == self.root_link_name {
                state.root_device = Some(target_str.to_string());
            } else {
                state.volumes.insert(volume_id.to_string(), target_str.to_string());
            }
        }
        Ok(())
    }

    fn link_path(&self, volume_id: &str) -> PathBuf {
        self.link_dir.join(volume_id)
    }

    /// Resolves `volume_id` to its current device, consulting the in-memory
    /// map first and falling back to the on-disk symlink.
    pub async fn get_device_for(&self, volume_id: &str) -> Option<String> {
        self.get_device(volume_id).await
    }

    async fn get_device(&self, volume_id: &str) -> Option<String> {
        {
            let state = self.state.lock().await;
            if let Some(dev) = state.volumes.get(volume_id) {
                return Some(dev.clone());
            }
        }
        let link = self.link_path(volume_id);
        let target = std::fs::read_link(&link).ok()?;
        let target_str = target.to_str()?.to_string();
        if target_str.starts_with("/dev/") {
            self.state.lock().await.volumes.insert(volume_id.to_string(), target_str.clone());
            Some(target_str)
        } else {
            None
        }
    }

    pub async fn add_mapping(
        &self,
        volume_id: &str,
        mount_device: &str,
        device: Option<&str>,
        static_mode: bool,
    ) -> Result<(), AgentError> {
        let device = match device {
            Some(d) if !d.is_empty() => normalize_device(d),
            _ => match self.get_device(volume_id).await {
                Some(d) => d,
                None => {
                    warn!(sl!(), "no existing mapping to reuse, skipping"; "volume_id" => volume_id);
                    return Ok(());
                }
            },
        };

        sys_util::fs::symlink_force(Path::new(&device), &self.link_path(volume_id))
            .map_err(|e| AgentError::Unexpected(e))?;

        {
            let mut state = self.state.lock().await;
            state.volumes.insert(volume_id.to_string(), device.clone());
            state.mounts.insert(device.clone(), mount_device.to_string());
        }

        if mount_device != NONE_MOUNT_POINT {
            self.backend
                .attach_volume(&device, mount_device, static_mode)
                .await
                .map_err(AgentError::Unexpected)?;
        }
        Ok(())
    }

    pub async fn remove_mapping(
        &self,
        volume_id: &str,
        ensure: bool,
        static_mode: bool,
    ) -> Result<(), AgentError> {
        let device = match self.get_device(volume_id).await {
            Some(d) => d,
            None => return Ok(()),
        };

        {
            let state = self.state.lock().await;
            if let Some(root) = &state.root_device {
                if &device == root || device.starts_with(root.as_str()) {
                    return Err(AgentError::InvalidInput {
                        reason: "refusing to remove the root device mapping".to_string(),
                    });
                }
            }
        }

        if ensure && self.device_visible_to_kernel(&device).await {
            warn!(sl!(), "device still visible to kernel, forcing removal"; "device" => &device);
            self.force_delete_device(&device).await.map_err(AgentError::Unexpected)?;
        }

        sys_util::fs::remove_if_present(&self.link_path(volume_id)).map_err(AgentError::Unexpected)?;

        let mount_device = {
            let mut state = self.state.lock().await;
            state.volumes.remove(volume_id);
            state.mounts.remove(&device).unwrap_or_else(|| NONE_MOUNT_POINT.to_string())
        };

        self.backend
            .detach_volume(&device, &mount_device, static_mode)
            .await
            .map_err(AgentError::Unexpected)?;
        Ok(())
    }

    async fn device_visible_to_kernel(&self, device: &str) -> bool {
        match self.runner.execute_root(&["fdisk", "-l"]).await {
            Ok((stdout, _)) => stdout.contains(device),
            Err(_) => false,
        }
    }

    /// Writes `"1"` to the device's SCSI `delete` sysfs node, never via a
    /// shell redirection.
    async fn force_delete_device(&self, device: &str) -> anyhow::Result<()> {
        let name = device.trim_start_matches("/dev/");
        let delete_path = format!("/sys/block/{name}/device/delete");
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().write(true).open(&delete_path)?;
        f.write_all(b"1")?;
        Ok(())
    }

    /// `lsblk -dn -o name,type,maj:min,size`, kept to whole disks whose name
    /// matches the grounding source's filter and excludes the reserved
    /// system-root naming pattern (`...da`).
    pub async fn list_host_devices(&self) -> anyhow::Result<Vec<HostDevice>> {
        let (stdout, _) = self.runner.execute_root(&["lsblk", "-dn", "-o", "NAME,TYPE,MAJ:MIN,SIZE"]).await?;
        let name_re = Regex::new(r"^x?[a-z]?d?[a-z]$").unwrap();
        let mut out = Vec::new();
        for line in stdout.lines() {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                continue;
            }
            let (name, ty, size) = (cols[0], cols[1], cols[3]);
            if ty != "disk" {
                continue;
            }
            if name.ends_with("da") {
                continue;
            }
            if !name_re.is_match(name) {
                continue;
            }
            let size_gb = size_to_gb(size).unwrap_or(0);
            out.push(HostDevice { name: name.to_string(), size_gb });
        }
        Ok(out)
    }

    /// Reconciles the live mapping against `desired`: removes stale
    /// entries whose backing device disappeared, then pairs newly
    /// requested volumes with unclaimed live devices by size.
    pub async fn update_bdm(&self, desired: &BlockDeviceInfo) -> Result<(), AgentError> {
        let mut new: HashMap<String, (String, u64)> = HashMap::new();
        for bdm in &desired.block_device_mapping {
            new.insert(bdm.volume_id().to_string(), (bdm.mount_device.clone(), bdm.size));
        }

        let current_ids: Vec<String> = {
            let state = self.state.lock().await;
            state.volumes.keys().cloned().collect()
        };

        let mut to_remove: Vec<String> = current_ids.iter().filter(|id| !new.contains_key(*id)).cloned().collect();

        for id in current_ids.iter().filter(|id| new.contains_key(*id)) {
            if let Some(device) = self.get_device(id).await {
                if !Path::new(&device).exists() {
                    to_remove.push(id.clone());
                }
            }
        }

        for id in &to_remove {
            self.remove_mapping(id, false, true).await?;
        }

        let current_ids_after: std::collections::HashSet<String> = {
            let state = self.state.lock().await;
            state.volumes.keys().cloned().collect()
        };
        let claimed: std::collections::HashSet<String> = {
            let state = self.state.lock().await;
            state.volumes.values().cloned().collect()
        };

        let to_add: Vec<String> = new.keys().filter(|id| !current_ids_after.contains(*id)).cloned().collect();

        let live = self.list_host_devices().await.map_err(AgentError::Unexpected)?;
        let unclaimed: Vec<&HostDevice> =
            live.iter().filter(|d| !claimed.iter().any(|c| c.ends_with(d.name.as_str()))).collect();

        let mut by_size: HashMap<u64, Vec<String>> = HashMap::new();
        for d in &unclaimed {
            by_size.entry(d.size_gb).or_default().push(d.name.clone());
        }
        for bucket in by_size.values_mut() {
            bucket.sort();
        }

        let mut wanted_by_size: HashMap<u64, Vec<String>> = HashMap::new();
        for id in &to_add {
            let size = new[id].1;
            wanted_by_size.entry(size).or_default().push(id.clone());
        }
        for bucket in wanted_by_size.values_mut() {
            bucket.sort();
        }

        for (size, mut ids) in wanted_by_size {
            let devices = if size == 0 {
                by_size.values().flatten().cloned().collect::<Vec<_>>()
            } else {
                by_size.get(&size).cloned().unwrap_or_default()
            };
            ids.sort();
            for (id, device) in ids.iter().zip(devices.iter()) {
                let (mount_device, _) = &new[id];
                self.add_mapping(id, mount_device, Some(&format!("/dev/{device}")), true).await?;
            }
        }

        Ok(())
    }
}

fn normalize_device(device: &str) -> String {
    let name = Path::new(device).file_name().and_then(|n| n.to_str()).unwrap_or(device);
    format!("/dev/{name}")
}

fn size_to_gb(raw: &str) -> Option<u64> {
    let (digits, multiplier_gb): (&str, f64) = match raw.chars().last() {
        Some('T') | Some('t') => (&raw[..raw.len() - 1], 1024.0),
        Some('G') | Some('g') => (&raw[..raw.len() - 1], 1.0),
        Some('M') | Some('m') => (&raw[..raw.len() - 1], 1.0 / 1024.0),
        _ => (raw, 1.0 / (1024.0 * 1024.0 * 1024.0)),
    };
    let value: f64 = digits.parse().ok()?;
    Some((value * multiplier_gb).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoopBackend;

    fn mapper(dir: &Path) -> VolumeMapper {
        VolumeMapper::new(
            dir.to_path_buf(),
            "data-device-link".to_string(),
            CommandRunner::new(true),
            Arc::new(NoopBackend),
        )
    }

    #[tokio::test]
    async fn setup_picks_up_existing_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/dev/sdb", dir.path().join("vol-1")).unwrap();
        let m = mapper(dir.path());
        m.setup().await.unwrap();
        assert_eq!(m.get_device("vol-1").await, Some("/dev/sdb".to_string()));
    }

    #[tokio::test]
    async fn add_mapping_creates_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let m = mapper(dir.path());
        m.add_mapping("vol-1", "none", Some("/dev/sdb"), true).await.unwrap();
        assert_eq!(std::fs::read_link(dir.path().join("vol-1")).unwrap(), Path::new("/dev/sdb"));
    }

    #[tokio::test]
    async fn add_mapping_without_device_is_noop_when_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let m = mapper(dir.path());
        m.add_mapping("vol-1", "none", None, true).await.unwrap();
        assert!(!dir.path().join("vol-1").exists());
    }

    #[tokio::test]
    async fn remove_mapping_refuses_on_root_device() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/dev/sda", dir.path().join("data-device-link")).unwrap();
        std::os::unix::fs::symlink("/dev/sda", dir.path().join("vol-root")).unwrap();
        let m = mapper(dir.path());
        m.setup().await.unwrap();
        let result = m.remove_mapping("vol-root", false, true).await;
        assert!(result.is_err());
    }

    #[test]
    fn size_parsing_handles_common_units() {
        assert_eq!(size_to_gb("10G"), Some(10));
        assert_eq!(size_to_gb("1T"), Some(1024));
    }
}
