// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C10: process-wide structured logging setup.
//!
//! Builds a fused terminal + JSON-file drain and installs it as the global
//! `slog_scope` logger, so every crate's `sl!()` call site picks it up
//! without threading a `Logger` through every function signature.

#[macro_use]
extern crate slog;

use std::fs::OpenOptions;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use slog::Drain;

/// Parses the config's `log_level` string (`"trace"`..`"critical"`) into a
/// `slog::Level`, defaulting to `Info` on anything unrecognized rather than
/// failing startup over a typo in a config file.
fn parse_level(level: &str) -> slog::Level {
    slog::Level::from_str(&level.to_lowercase()).unwrap_or(slog::Level::Info)
}

/// Installs the global logger and returns the guard that keeps it alive;
/// drop the guard to flush the async drain and restore the previous logger
/// (used by tests that want a scoped, non-global logger instead).
pub fn setup(log_level: &str, log_dir: &Path, component: &str) -> Result<slog_scope::GlobalLoggerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    let log_path = log_dir.join(format!("{component}.log"));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    let json_drain = slog_json::Json::new(file)
        .add_default_keys()
        .build()
        .fuse();

    let term_decorator = slog_term::TermDecorator::new().build();
    let term_drain = slog_term::FullFormat::new(term_decorator).build().fuse();

    let level = parse_level(log_level);
    let duplicated = slog::Duplicate::new(term_drain, json_drain).fuse();
    let leveled = slog::LevelFilter::new(duplicated, level).fuse();
    let async_drain = slog_async::Async::new(leveled).build().fuse();

    let logger = slog::Logger::root(async_drain, o!("component" => component.to_string()));
    let guard = slog_scope::set_global_logger(logger);
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_falls_back_to_info_on_garbage() {
        assert_eq!(parse_level("not-a-level"), slog::Level::Info);
        assert_eq!(parse_level("DEBUG"), slog::Level::Debug);
    }

    #[test]
    fn setup_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let guard = setup("info", dir.path(), "test-component").unwrap();
        info!(slog_scope::logger(), "hello"; "k" => "v");
        drop(guard);
        assert!(dir.path().join("test-component.log").exists());
    }
}
