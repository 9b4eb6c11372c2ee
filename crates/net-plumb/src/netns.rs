// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Wires a container's kernel network namespace up for `ip netns` tooling,
//! and helps pick names for interfaces created inside it.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agent_types::AgentError;
use sys_util::command::CommandRunner;
use tokio::time::sleep;

const PID_POLL_ATTEMPTS: u32 = 20;
const PID_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub const NETNS_DIR: &str = "/var/run/netns";

/// Polls `inspect_pid` (expected to query the container backend) up to
/// [`PID_POLL_ATTEMPTS`] times, [`PID_POLL_INTERVAL`] apart, until it
/// returns a nonzero pid or the budget is exhausted.
pub async fn find_container_pid<F, Fut>(mut inspect_pid: F) -> Result<u32, AgentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<u32>>,
{
    for attempt in 0..PID_POLL_ATTEMPTS {
        match inspect_pid().await {
            Ok(pid) if pid != 0 => return Ok(pid),
            _ => {
                if attempt + 1 < PID_POLL_ATTEMPTS {
                    sleep(PID_POLL_INTERVAL).await;
                }
            }
        }
    }
    Err(AgentError::Unexpected(anyhow::anyhow!(
        "container pid did not become available within the polling budget"
    )))
}

/// Symlinks `/var/run/netns/<container_id>` to `/proc/<pid>/ns/net`, so
/// `ip netns exec <container_id> ...` resolves to the container's namespace.
pub fn attach_netns(container_id: &str, pid: u32) -> anyhow::Result<()> {
    let target = PathBuf::from(format!("/proc/{pid}/ns/net"));
    let link = Path::new(NETNS_DIR).join(container_id);
    sys_util::fs::symlink_force(&target, &link)
}

pub fn detach_netns(container_id: &str) -> anyhow::Result<()> {
    let link = Path::new(NETNS_DIR).join(container_id);
    sys_util::fs::remove_if_present(&link)
}

/// Lists interfaces inside `container_id`'s netns via `ip link show` and
/// returns the lowest-numbered `eth<N>` name not already taken.
pub async fn available_eth_name(runner: &CommandRunner, container_id: &str) -> anyhow::Result<String> {
    let (stdout, _) = runner
        .execute_root(&["ip", "netns", "exec", container_id, "ip", "link", "show"])
        .await?;
    let taken: HashSet<u32> = stdout
        .lines()
        .filter_map(|line| {
            let name = line.split(':').nth(1)?.trim();
            let name = name.split('@').next()?;
            name.strip_prefix("eth")?.parse::<u32>().ok()
        })
        .collect();
    let next = (0u32..).find(|i| !taken.contains(i)).expect("u32 space is not exhausted");
    Ok(format!("eth{next}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_container_pid_returns_on_first_nonzero() {
        let pid = find_container_pid(|| async { Ok(42) }).await.unwrap();
        assert_eq!(pid, 42);
    }

    #[tokio::test]
    async fn find_container_pid_times_out_on_persistent_zero() {
        let result = find_container_pid(|| async { Ok(0) }).await;
        assert!(result.is_err());
    }

    #[test]
    fn eth_name_parsing_picks_lowest_gap() {
        let taken: HashSet<u32> = ["eth0", "eth2"]
            .iter()
            .filter_map(|n| n.strip_prefix("eth").and_then(|s| s.parse().ok()))
            .collect();
        let next = (0u32..).find(|i| !taken.contains(i)).unwrap();
        assert_eq!(next, 1);
    }

    #[test]
    fn eth_name_parsing_strips_ifindex_suffix() {
        // `ip link show` inside a netns prints moved-in veths as `eth0@if7:`,
        // not bare `eth0:`.
        let stdout = "1: lo: <LOOPBACK>\n2: eth0@if7: <BROADCAST,UP>\n";
        let taken: HashSet<u32> = stdout
            .lines()
            .filter_map(|line| {
                let name = line.split(':').nth(1)?.trim();
                let name = name.split('@').next()?;
                name.strip_prefix("eth")?.parse::<u32>().ok()
            })
            .collect();
        let next = (0u32..).find(|i| !taken.contains(i)).unwrap();
        assert_eq!(next, 1);
    }
}
