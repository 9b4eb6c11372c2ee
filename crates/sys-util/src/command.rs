// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! C1: the command runner. Every other component shells out to a host
//! binary (`brctl`, `ovs-vsctl`, `lxc-*`, `ip`, `lsblk`, `dd`, `tgt-admin`,
//! ...) through this single chokepoint, so timeouts, retries, exit-code
//! whitelisting and logging are handled in exactly one place.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use nix::unistd::Uid;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::sleep;

use crate::sl;

/// A command that ran but exited outside its accepted set, or otherwise
/// could not be run to completion.
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub argv: Vec<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command {:?} failed (exit={:?}): {}",
            self.argv, self.exit_code, self.stderr
        )
    }
}

impl std::error::Error for CommandFailure {}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub stdin: Option<Vec<u8>>,
    pub run_as_root: bool,
    pub accepted_exit_codes: Vec<i32>,
    pub attempts: u32,
    pub timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            stdin: None,
            run_as_root: false,
            accepted_exit_codes: vec![0],
            attempts: 1,
            timeout: None,
        }
    }
}

impl ExecuteOptions {
    pub fn root() -> Self {
        ExecuteOptions { run_as_root: true, ..Default::default() }
    }

    pub fn with_accepted_exit_codes(mut self, codes: &[i32]) -> Self {
        self.accepted_exit_codes = codes.to_vec();
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_stdin(mut self, stdin: Vec<u8>) -> Self {
        self.stdin = Some(stdin);
        self
    }
}

/// Runs external binaries on behalf of every higher-level component.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    /// When set, no process is actually spawned; every call logs its argv
    /// and returns an empty success. Mirrors the grounding source's
    /// `fake_execute` config option, used in tests and dry runs.
    pub fake_execute: bool,
}

impl CommandRunner {
    pub fn new(fake_execute: bool) -> Self {
        CommandRunner { fake_execute }
    }

    /// Convenience for the common case of a single-attempt, root-privileged
    /// call accepting only exit code 0.
    pub async fn execute_root(&self, argv: &[&str]) -> Result<(String, String), CommandFailure> {
        self.execute(argv, ExecuteOptions::root()).await
    }

    pub async fn execute(
        &self,
        argv: &[&str],
        opts: ExecuteOptions,
    ) -> Result<(String, String), CommandFailure> {
        let owned: Vec<String> = argv.iter().map(|s| s.to_string()).collect();

        if self.fake_execute {
            debug!(sl!(), "fake execute"; "argv" => owned.join(" "));
            return Ok((String::new(), String::new()));
        }

        let attempts = opts.attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.run_once(&owned, &opts).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    warn!(sl!(), "command attempt failed";
                        "argv" => owned.join(" "), "attempt" => attempt, "error" => %e);
                    last_err = Some(e);
                    if attempt < attempts {
                        sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
        Err(last_err.expect("at least one attempt always runs"))
    }

    async fn run_once(
        &self,
        argv: &[String],
        opts: &ExecuteOptions,
    ) -> Result<(String, String), CommandFailure> {
        let (program, args) = self.build_invocation(argv, opts.run_as_root);

        debug!(sl!(), "executing command"; "argv" => args.join(" "));

        let mut cmd = Command::new(&program);
        cmd.args(&args);
        cmd.stdin(if opts.stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let fail = |argv: &[String], exit_code: Option<i32>, stdout: String, stderr: String| {
            CommandFailure { argv: argv.to_vec(), exit_code, stdout, stderr }
        };

        let mut child = cmd.spawn().map_err(|e| {
            fail(argv, None, String::new(), format!("failed to spawn {program}: {e}"))
        })?;

        if let Some(stdin) = &opts.stdin {
            if let Some(mut pipe) = child.stdin.take() {
                let _ = pipe.write_all(stdin).await;
            }
        }

        let wait = child.wait_with_output();
        let output = match opts.timeout {
            Some(t) => tokio::time::timeout(t, wait).await.map_err(|_| {
                fail(argv, None, String::new(), "timed out".to_string())
            })?,
            None => wait.await,
        }
        .map_err(|e| fail(argv, None, String::new(), format!("failed to wait: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code();

        let accepted = code.map(|c| opts.accepted_exit_codes.contains(&c)).unwrap_or(false);
        if !accepted {
            return Err(fail(argv, code, stdout, stderr));
        }
        Ok((stdout, stderr))
    }

    /// Prepends `sudo` only when the process isn't already running as root
    /// and the caller asked for root privileges; when we're already root
    /// (the ordinary deployment) this is a no-op, matching the grounding
    /// source's stubbed-out root helper.
    fn build_invocation(&self, argv: &[String], run_as_root: bool) -> (String, Vec<String>) {
        if run_as_root && !Uid::effective().is_root() {
            let mut args = vec![argv[0].clone()];
            args.extend(argv[1..].iter().cloned());
            ("sudo".to_string(), args)
        } else {
            (argv[0].clone(), argv[1..].to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_execute_never_spawns() {
        let runner = CommandRunner::new(true);
        let (out, err) = runner.execute(&["definitely-not-a-real-binary"], ExecuteOptions::default()).await.unwrap();
        assert!(out.is_empty());
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn accepted_exit_codes_allow_nonzero() {
        let runner = CommandRunner::new(false);
        let opts = ExecuteOptions::default().with_accepted_exit_codes(&[0, 1]);
        let result = runner.execute(&["sh", "-c", "exit 1"], opts).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unaccepted_exit_code_is_a_failure() {
        let runner = CommandRunner::new(false);
        let result = runner.execute(&["sh", "-c", "exit 7"], ExecuteOptions::default()).await;
        let err = result.unwrap_err();
        assert_eq!(err.exit_code, Some(7));
    }

    #[tokio::test]
    async fn attempts_retry_on_failure() {
        let runner = CommandRunner::new(false);
        let opts = ExecuteOptions::default().with_attempts(2);
        let result = runner.execute(&["sh", "-c", "exit 9"], opts).await;
        assert!(result.is_err());
    }
}
