// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Binary entry point: parses CLI flags, loads configuration, installs the
//! global logger, builds the `Agent` composition root and serves the HTTP
//! surface until a shutdown signal arrives.

mod agent;
mod controller;
mod http;
mod password;

use std::path::PathBuf;
use std::sync::Arc;

use agent_types::AgentConfig;
use clap::Parser;
use slog::info;
use sys_util::sl;

#[derive(Debug, Parser)]
#[command(name = "wormhole-agent")]
struct Cli {
    /// Path to the agent's TOML configuration file.
    #[arg(long, default_value = "/etc/wormhole/agent.toml")]
    config: PathBuf,

    /// Overrides the `port` configured in the config file.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AgentConfig::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let _log_guard = logging::setup(&config.log_level, &config.log_dir, "wormhole-agent")?;
    info!(sl!(), "starting wormhole-agent"; "port" => config.port);

    let agent = Arc::new(agent::Agent::new(config.clone()).await?);
    let router = http::build_router(agent);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(sl!(), "listening"; "addr" => addr.to_string());

    axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
