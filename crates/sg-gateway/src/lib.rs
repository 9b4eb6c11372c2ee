// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C8: the storage-gateway controller. Persists a per-volume `tgt` target
//! definition as a drop-in file and drives `tgt-admin` to enable/disable
//! replication of a volume over iSCSI.
//!
//! Grounded on the grounding source's `storagegateway.py` (`SGController`)
//! for the target-file template and the `tgt-admin` invocation sequence;
//! the persistence mechanism is redesigned per-file (one drop-in under
//! `sg_targets_dir` per volume) instead of `sed`-editing a single shared
//! `targets.conf`, so writes are atomic and never corrupt a neighbour's
//! entry.

use std::path::PathBuf;

use agent_types::AgentError;
use sys_util::command::CommandRunner;
use sys_util::fs::write_atomic;

pub struct SgGateway {
    runner: CommandRunner,
    targets_dir: PathBuf,
    server_host: String,
    server_port: u16,
}

impl SgGateway {
    pub fn new(runner: CommandRunner, targets_dir: PathBuf, server_host: String, server_port: u16) -> Self {
        SgGateway { runner, targets_dir, server_host, server_port }
    }

    fn target_file(&self, volume_id: &str) -> PathBuf {
        self.targets_dir.join(volume_id)
    }

    fn render(&self, target_iqn: &str, volume_id: &str, device: &str) -> String {
        format!(
            "# target-for-{volume_id}\n<target {target_iqn}>\n    bs-type hijacker\n    bsopts \"host={host}\\;port={port}\\;volume={volume_id}\\;device={device}\"\n    backing-store {device}\n    initiator-address ALL\n</target>\n",
            host = self.server_host,
            port = self.server_port,
        )
    }

    pub async fn enable_sg(&self, target_iqn: &str, volume_id: &str, device: &str) -> Result<(), AgentError> {
        let path = self.target_file(volume_id);
        let contents = self.render(target_iqn, volume_id, device);
        write_atomic(&path, contents.as_bytes()).map_err(AgentError::Unexpected)?;

        self.runner
            .execute_root(&["tgt-admin", "--update", target_iqn])
            .await
            .map_err(to_backend_failure)?;
        Ok(())
    }

    pub async fn disable_sg(&self, target_iqn: &str, volume_id: &str) -> Result<(), AgentError> {
        self.runner
            .execute_root(&["tgt-admin", "--force", "--delete", target_iqn])
            .await
            .map_err(to_backend_failure)?;

        if self.target_still_present(target_iqn).await? {
            self.runner
                .execute_root(&["tgt-admin", "--delete", target_iqn])
                .await
                .map_err(to_backend_failure)?;
        }

        let path = self.target_file(volume_id);
        if path.is_file() {
            std::fs::remove_file(&path).map_err(|e| AgentError::Unexpected(anyhow::anyhow!(e)))?;
        }
        Ok(())
    }

    async fn target_still_present(&self, target_iqn: &str) -> Result<bool, AgentError> {
        let (stdout, _) = self.runner.execute_root(&["tgt-admin", "--show"]).await.map_err(to_backend_failure)?;
        Ok(stdout.lines().any(|line| line.contains(target_iqn)))
    }
}

fn to_backend_failure(e: sys_util::command::CommandFailure) -> AgentError {
    AgentError::BackendFailure { argv: e.argv, exit_code: e.exit_code, stdout: e.stdout, stderr: e.stderr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn gateway(dir: &Path) -> SgGateway {
        SgGateway::new(CommandRunner::new(true), dir.to_path_buf(), "127.0.0.1".to_string(), 9999)
    }

    #[tokio::test]
    async fn enable_sg_writes_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path());
        gw.enable_sg("iqn.2024-01.local:vol-1", "vol-1", "/dev/sdb").await.unwrap();
        let contents = std::fs::read_to_string(dir.path().join("vol-1")).unwrap();
        assert!(contents.contains("backing-store /dev/sdb"));
        assert!(contents.contains("initiator-address ALL"));
    }

    #[tokio::test]
    async fn disable_sg_removes_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path());
        gw.enable_sg("iqn.2024-01.local:vol-1", "vol-1", "/dev/sdb").await.unwrap();
        gw.disable_sg("iqn.2024-01.local:vol-1", "vol-1").await.unwrap();
        assert!(!dir.path().join("vol-1").exists());
    }
}
