// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use redis_server_rs::{
    cfg::{cli::parse_args, config::Config, logger::init_logger},
    server::Server,
};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let cfg = match &args.config_path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("failed to load config {path:?}"))?,
        None => Config::default(),
    };

    let _log_guard = init_logger(&cfg).context("failed to initialize logging")?;
    info!(
        port = cfg.server.port,
        databases = cfg.server.databases,
        cluster = %cfg.cluster.enabled,
        "starting"
    );

    let server = Server::new(cfg);

    // Ctrl-C triggers the same cancellation path as SHUTDOWN.
    let shutdown = server.shutdown.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("interrupt received; shutting down");
            shutdown.cancel();
        }
    });

    server.run().await
}
