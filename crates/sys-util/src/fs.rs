// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Filesystem helpers shared by the volume mapper and the storage-gateway
//! target writer: atomic symlink replacement and durable file writes.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};

/// Creates `link` pointing at `target`, replacing any existing link/file at
/// `link` atomically. Mirrors `ln -sf`: build the new symlink next to the
/// destination under a throwaway name, then rename it over the final path
/// so a reader never observes a missing or half-written link.
pub fn symlink_force(target: &Path, link: &Path) -> Result<()> {
    let parent = link
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("creating parent dir {}", parent.display()))?;

    let tmp = parent.join(format!(
        ".{}.tmp-symlink",
        link.file_name().and_then(|n| n.to_str()).unwrap_or("link")
    ));
    let _ = std::fs::remove_file(&tmp);
    std::os::unix::fs::symlink(target, &tmp)
        .with_context(|| format!("symlinking {} -> {}", tmp.display(), target.display()))?;
    std::fs::rename(&tmp, link)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), link.display()))?;
    Ok(())
}

/// Removes `link` if it exists, tolerating it already being gone.
pub fn remove_if_present(link: &Path) -> Result<()> {
    match std::fs::remove_file(link) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", link.display())),
    }
}

/// Writes `contents` to `path` durably: write to a temp file in the same
/// directory, fsync it, rename over `path`, then fsync the directory so the
/// rename itself survives a crash. Used for the storage-gateway target files
/// and the persisted settings snapshot, both of which must never be observed
/// half-written.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("creating parent dir {}", parent.display()))?;

    let tmp = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file")
    ));

    {
        use std::io::Write;
        let mut f = std::fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(contents)
            .with_context(|| format!("writing {}", tmp.display()))?;
        f.sync_all()
            .with_context(|| format!("fsyncing {}", tmp.display()))?;
    }

    std::fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;

    let dir = std::fs::File::open(parent)
        .with_context(|| format!("opening dir {}", parent.display()))?;
    dir.sync_all()
        .with_context(|| format!("fsyncing dir {}", parent.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symlink_force_replaces_existing_link() {
        let dir = tempfile::tempdir().unwrap();
        let target_a = dir.path().join("a");
        let target_b = dir.path().join("b");
        std::fs::write(&target_a, b"a").unwrap();
        std::fs::write(&target_b, b"b").unwrap();
        let link = dir.path().join("link");

        symlink_force(&target_a, &link).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), target_a);

        symlink_force(&target_b, &link).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), target_b);
    }

    #[test]
    fn write_atomic_produces_final_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn remove_if_present_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("gone");
        remove_if_present(&link).unwrap();
        remove_if_present(&link).unwrap();
    }
}
