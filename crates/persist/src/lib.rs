// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//

//! Durable storage for the one piece of state the agent needs to survive a
//! restart: the last network/volume manifests it was handed, so interfaces
//! and volumes can still be attached or detached individually afterwards.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use agent_types::PersistedSettings;
use anyhow::{Context, Result};

/// Reads the persisted settings from `path`, returning an empty snapshot
/// (no network interfaces, no block devices) if the file doesn't exist yet
/// — the state on a freshly provisioned host before its first `start` call.
pub fn load(path: &Path) -> Result<PersistedSettings> {
    if !path.exists() {
        return Ok(PersistedSettings::default());
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))
}

/// Writes `settings` to `path` durably via `sys_util::fs::write_atomic`, so a
/// crash mid-write never leaves a half-written settings file behind.
pub fn save(path: &Path, settings: &PersistedSettings) -> Result<()> {
    let mut buf = Vec::new();
    serde_json::to_writer_pretty(&mut buf, settings)?;
    sys_util::fs::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_types::Vif;

    #[test]
    fn missing_file_yields_empty_settings() {
        let settings = load(Path::new("/nonexistent/settings.json")).unwrap();
        assert!(settings.network_info.is_empty());
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = PersistedSettings::default();
        settings.network_info.push(Vif {
            id: "abcdef012345".to_string(),
            address: "aa:bb:cc:dd:ee:ff".to_string(),
            vif_type: "ovs".to_string(),
            mtu: 1300,
            network: Default::default(),
        });
        save(&path, &settings).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.network_info.len(), 1);
        assert_eq!(loaded.network_info[0].id, "abcdef012345");
    }
}
