//! Configuration loading.
//!
//! Four layers, highest precedence first: CLI flag, `RENDERD_`-prefixed
//! environment variable, `renderd.toml` config file, built-in default. A
//! missing config file is not an error — it just means that layer
//! contributes nothing.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Fully resolved configuration the CLI hands off to the broker and web
/// server.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub pool_size: usize,
    pub max_seed_renderer: usize,
    pub check_interval: Duration,
    pub default_priority: i64,
}

/// Shape of `renderd.toml`. Every field optional so a partial file is valid.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind_addr: Option<String>,
    port: Option<u16>,
    pool_size: Option<usize>,
    max_seed_renderer: Option<usize>,
    check_interval_secs: Option<u64>,
    default_priority: Option<i64>,
}

/// CLI overrides; every field `None` unless the flag was actually passed.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    pub pool_size: Option<usize>,
    pub max_seed_renderer: Option<usize>,
    pub check_interval_secs: Option<u64>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("RENDERD_{name}")).ok()
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.parse().ok())
}

impl Config {
    /// Load and layer configuration from `config_path` (if it exists), the
    /// `RENDERD_*` environment, and `overrides`, falling back to built-in
    /// defaults for anything none of those layers set.
    pub fn load(config_path: &Path, overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let file = if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)?;
            toml::from_str(&contents)?
        } else {
            FileConfig::default()
        };

        let pool_size = overrides
            .pool_size
            .or_else(|| env_parsed("POOL_SIZE"))
            .or(file.pool_size)
            .unwrap_or_else(num_cpus);

        let max_seed_renderer = overrides
            .max_seed_renderer
            .or_else(|| env_parsed("MAX_SEED_RENDERER"))
            .or(file.max_seed_renderer)
            .unwrap_or(pool_size)
            .min(pool_size);

        let check_interval_secs = overrides
            .check_interval_secs
            .or_else(|| env_parsed("CHECK_INTERVAL_SECS"))
            .or(file.check_interval_secs)
            .unwrap_or(30);

        Ok(Self {
            bind_addr: overrides
                .bind_addr
                .or_else(|| env_var("BIND_ADDR"))
                .or(file.bind_addr)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: overrides
                .port
                .or_else(|| env_parsed("PORT"))
                .or(file.port)
                .unwrap_or(8080),
            pool_size,
            max_seed_renderer,
            check_interval: Duration::from_secs(check_interval_secs),
            default_priority: file.default_priority.unwrap_or(10),
        })
    }

    /// Build the sorted-ascending admission vector: `[50] * (pool_size -
    /// max_seed) + [0] * max_seed`, reserving the high-threshold slots for
    /// interactive work and leaving the low-threshold slots for
    /// seeding/background work.
    pub fn priority_vector(&self) -> Vec<i64> {
        let non_seed = self.pool_size - self.max_seed_renderer;
        let mut priorities = vec![50i64; non_seed];
        priorities.extend(std::iter::repeat(0i64).take(self.max_seed_renderer));
        priorities.sort_unstable();
        priorities
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
