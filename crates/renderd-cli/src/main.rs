//! CLI entry point for the renderd background render daemon.
//!
//! Starts the broker, spawns its worker pool, and serves the HTTP front end
//! until shut down.

mod cli;
mod config;
mod helpers;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use renderd_core::broker::{Broker, BrokerConfig};
use renderd_core::pool::WorkerPool;
use renderd_core::worker::builtin_commands;
use renderd_web::{WebConfig, WebServer};

use crate::cli::Cli;
use crate::config::{Config, ConfigOverrides};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    helpers::init_tracing(if cli.verbose { "debug" } else { "info" });

    let overrides = ConfigOverrides {
        bind_addr: cli.bind.clone(),
        port: cli.port,
        pool_size: cli.pool_size,
        max_seed_renderer: cli.max_seed_renderer,
        check_interval_secs: cli.check_interval_secs,
    };
    let config = Config::load(&cli.config, overrides).context("failed to load configuration")?;

    let priorities = config.priority_vector();
    info!(
        pool_size = config.pool_size,
        priorities = ?priorities,
        "starting worker pool"
    );

    let broker_config = BrokerConfig {
        priorities,
        pool_size: config.pool_size,
        default_priority: config.default_priority,
        check_interval: config.check_interval,
    };
    let worker_pool = WorkerPool::new(config.pool_size, builtin_commands(), 4096);
    let (broker, _broker_task) =
        Broker::spawn(broker_config, worker_pool).context("failed to start broker")?;

    let web_config = WebConfig {
        bind_addr: config.bind_addr.clone(),
        port: config.port,
    };
    println!();
    println!("  renderd v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  listening on http://{}:{}",
        web_config.bind_addr, web_config.port
    );
    println!();

    let server = WebServer::new(web_config, broker);
    server.start().await.context("web server failed")?;

    Ok(())
}
