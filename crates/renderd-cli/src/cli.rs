//! CLI argument definitions.

use std::path::PathBuf;

use clap::Parser;

/// renderd -- a background render daemon.
#[derive(Parser)]
#[command(
    name = "renderd",
    version,
    about = "Scheduling and dispatch broker for background rendering work"
)]
pub struct Cli {
    /// Path to the TOML config file. Missing file is not an error.
    #[arg(long, default_value = "renderd.toml")]
    pub config: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on.
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Number of worker slots. Defaults to the number of available CPUs.
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Maximum number of worker slots reserved for low-priority (seeding)
    /// work. Defaults to the full pool size.
    #[arg(long)]
    pub max_seed_renderer: Option<usize>,

    /// Seconds between worker liveness checks.
    #[arg(long)]
    pub check_interval_secs: Option<u64>,

    /// Increase log verbosity.
    #[arg(long, short)]
    pub verbose: bool,
}
