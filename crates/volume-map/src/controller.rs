// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C7: the volume controller. Sits above the mapper and adds the
//! operations an orchestrator drives directly: host-device listing with an
//! optional SCSI rescan, bulk device-to-device clone, forced device
//! removal, and ISCSI connect/disconnect.
//!
//! Grounded on the grounding source's `volumes.py` (`list_devices`,
//! `_dd_copy`, `remove_device`, `connect_volume`) for the command sequences
//! and the `iflag=direct`/`conv=fdatasync` fallback probing.

use std::sync::Arc;

use agent_types::AgentError;
use slog::warn;
use sys_util::command::{CommandRunner, ExecuteOptions};
use sys_util::sl;
use task_manager::TaskManager;

use crate::blocksize::calculate_count;
use crate::mapper::{HostDevice, VolumeMapper};

pub struct VolumeController {
    mapper: Arc<VolumeMapper>,
    runner: CommandRunner,
    tasks: Arc<TaskManager>,
    default_blocksize: String,
}

impl VolumeController {
    pub fn new(
        mapper: Arc<VolumeMapper>,
        runner: CommandRunner,
        tasks: Arc<TaskManager>,
        default_blocksize: String,
    ) -> Self {
        VolumeController { mapper, runner, tasks, default_blocksize }
    }

    /// `list(scan=true)`: optionally pokes every SCSI host to rescan for new
    /// LUNs before delegating to the mapper's device listing.
    pub async fn list(&self, scan: bool) -> Result<Vec<HostDevice>, AgentError> {
        if scan {
            self.rescan_scsi_hosts().await;
        }
        self.mapper.list_host_devices().await.map_err(AgentError::Unexpected)
    }

    async fn rescan_scsi_hosts(&self) {
        let pattern = std::path::Path::new("/sys/class/scsi_host");
        let Ok(entries) = std::fs::read_dir(pattern) else { return };
        for entry in entries.flatten() {
            let scan_path = entry.path().join("scan");
            if !scan_path.exists() {
                continue;
            }
            use std::io::Write;
            match std::fs::OpenOptions::new().write(true).open(&scan_path) {
                Ok(mut f) => {
                    if let Err(e) = f.write_all(b"- - -") {
                        warn!(sl!(), "scsi rescan write failed"; "path" => scan_path.display().to_string(), "error" => %e);
                    }
                }
                Err(e) => {
                    warn!(sl!(), "could not open scsi host scan node"; "path" => scan_path.display().to_string(), "error" => %e);
                }
            }
        }
    }

    /// `clone(dst, src)`: schedules a `dd` copy of `min(src.size, dst.size)`
    /// GiB, converted to mebibytes, between the two already-mapped devices
    /// and returns a task id immediately. The sizes come from the
    /// orchestrator's request body, matching the grounding source's
    /// `min(int(src_vref['size']), int(volume['size']))` rather than
    /// whatever the live device listing reports.
    pub async fn clone(
        &self,
        dst_volume_id: &str,
        dst_size_gb: u64,
        src_volume_id: &str,
        src_size_gb: u64,
    ) -> Result<String, AgentError> {
        let dst_dev = self.resolve_device(dst_volume_id).await?;
        let src_dev = self.resolve_device(src_volume_id).await?;

        let size_mib = std::cmp::min(src_size_gb, dst_size_gb) * 1024;
        let (blocksize, count) = calculate_count(&self.default_blocksize, size_mib);
        let runner = self.runner.clone();

        let direct_flags = self.probe_direct_io(&src_dev, &dst_dev).await;

        let task_id = self
            .tasks
            .add(move || {
                let handle = tokio::runtime::Handle::current();
                handle.block_on(async move {
                    run_dd_copy(&runner, &src_dev, &dst_dev, &blocksize, count, direct_flags)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(dst_dev)
                })
            })
            .await;
        Ok(task_id)
    }

    async fn resolve_device(&self, volume_id: &str) -> Result<String, AgentError> {
        self.mapper
            .get_device_for(volume_id)
            .await
            .ok_or_else(|| AgentError::VolumeNotFound { id: volume_id.to_string() })
    }

    /// Probes whether `O_DIRECT` is usable on both endpoints; if either
    /// probe fails, falls back to `conv=fdatasync` instead.
    async fn probe_direct_io(&self, src: &str, dst: &str) -> DirectIoMode {
        let probe = |path: String| {
            let runner = self.runner.clone();
            async move {
                let of_arg = format!("of={path}");
                runner
                    .execute(
                        &["dd", "if=/dev/zero", of_arg.as_str(), "bs=512", "count=0", "oflag=direct"],
                        ExecuteOptions::root(),
                    )
                    .await
                    .is_ok()
            }
        };
        if probe(src.to_string()).await && probe(dst.to_string()).await {
            DirectIoMode::Direct
        } else {
            DirectIoMode::Fdatasync
        }
    }

    /// `remove_device(name)`: flushes buffers then forces the kernel to
    /// drop the device via its SCSI `delete` sysfs node.
    pub async fn remove_device(&self, name: &str) -> Result<(), AgentError> {
        let device_path = format!("/dev/{name}");
        self.runner
            .execute_root(&["blockdev", "--flushbufs", device_path.as_str()])
            .await
            .map_err(|e| AgentError::BackendFailure {
                argv: e.argv,
                exit_code: e.exit_code,
                stdout: e.stdout,
                stderr: e.stderr,
            })?;

        let delete_path = format!("/sys/block/{name}/device/delete");
        use std::io::Write;
        std::fs::OpenOptions::new()
            .write(true)
            .open(&delete_path)
            .and_then(|mut f| f.write_all(b"1"))
            .map_err(|e| AgentError::Unexpected(anyhow::anyhow!("writing {delete_path}: {e}")))?;
        Ok(())
    }

    pub async fn connect_volume(&self, portal: &str, target_iqn: &str) -> Result<String, AgentError> {
        self.runner
            .execute_root(&["iscsiadm", "-m", "discovery", "-t", "sendtargets", "-p", portal])
            .await
            .map_err(to_backend_failure("connect_volume:discovery"))?;
        self.runner
            .execute_root(&["iscsiadm", "-m", "node", "-T", target_iqn, "-p", portal, "--login"])
            .await
            .map_err(to_backend_failure("connect_volume:login"))?;
        Ok(target_iqn.to_string())
    }

    pub async fn disconnect_volume(&self, portal: &str, target_iqn: &str) -> Result<(), AgentError> {
        self.runner
            .execute_root(&["iscsiadm", "-m", "node", "-T", target_iqn, "-p", portal, "--logout"])
            .await
            .map_err(to_backend_failure("disconnect_volume:logout"))?;
        self.runner
            .execute_root(&["iscsiadm", "-m", "node", "-T", target_iqn, "-p", portal, "--op", "delete"])
            .await
            .map_err(to_backend_failure("disconnect_volume:delete"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum DirectIoMode {
    Direct,
    Fdatasync,
}

async fn run_dd_copy(
    runner: &CommandRunner,
    src: &str,
    dst: &str,
    blocksize: &str,
    count: u64,
    mode: DirectIoMode,
) -> anyhow::Result<()> {
    let count_arg = count.to_string();
    let mut argv = vec![
        "dd".to_string(),
        format!("if={src}"),
        format!("of={dst}"),
        format!("bs={blocksize}"),
        format!("count={count_arg}"),
    ];
    match mode {
        DirectIoMode::Direct => {
            argv.push("iflag=direct".to_string());
            argv.push("oflag=direct".to_string());
        }
        DirectIoMode::Fdatasync => {
            argv.push("conv=fdatasync".to_string());
        }
    }
    let argv_refs: Vec<&str> = argv.iter().map(|s| s.as_str()).collect();
    runner
        .execute(&argv_refs, ExecuteOptions::root().with_attempts(1))
        .await?;
    Ok(())
}

fn to_backend_failure(op: &'static str) -> impl FnOnce(sys_util::command::CommandFailure) -> AgentError {
    move |e| AgentError::BackendFailure {
        argv: {
            let mut argv = vec![op.to_string()];
            argv.extend(e.argv);
            argv
        },
        exit_code: e.exit_code,
        stdout: e.stdout,
        stderr: e.stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoopBackend;

    fn controller(dir: &std::path::Path) -> VolumeController {
        let mapper = Arc::new(VolumeMapper::new(
            dir.to_path_buf(),
            "data-device-link".to_string(),
            CommandRunner::new(true),
            Arc::new(NoopBackend),
        ));
        VolumeController::new(mapper, CommandRunner::new(true), Arc::new(TaskManager::new()), "1M".to_string())
    }

    #[tokio::test]
    async fn list_with_scan_disabled_delegates_to_mapper() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(dir.path());
        let result = c.list(false).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn clone_fails_fast_for_unknown_volume() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(dir.path());
        let result = c.clone("dst", 2, "src", 3).await;
        assert!(matches!(result, Err(AgentError::VolumeNotFound { .. })));
    }
}
