//! TOML configuration for netbench.
//!
//! Layered: an explicit `--config` path, then the `NETBENCH_CONFIG`
//! environment variable, then `/etc/netbench/netbench.toml`, then the
//! compiled-in defaults. Every section is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const CONFIG_ENV_VAR: &str = "NETBENCH_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/netbench/netbench.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub iperf3: Iperf3Config,
    #[serde(default)]
    pub ping: PingConfig,
    #[serde(default)]
    pub scenarios: ScenarioConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded netbench configuration");
        Ok(config)
    }

    /// Resolve the configuration. An explicit path must load; the implicit
    /// locations fall through to defaults when missing or broken.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        Ok(Self::load_or_default())
    }

    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "NETBENCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Iperf3
// ---------------------------------------------------------------------------

/// Stream-test tool invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Iperf3Config {
    /// Path (or bare command name resolved via `$PATH`) to the iperf3 binary.
    pub path: String,
    /// Seconds added to the test duration before a standard run is killed.
    pub standard_grace_secs: u64,
    /// Seconds added to the scenario duration before a concurrent unit is killed.
    pub unit_grace_secs: u64,
    /// Optional `taskset -c` core list to pin iperf3 to (e.g. `"2,3"`).
    pub pin_cores: Option<String>,
}

impl Default for Iperf3Config {
    fn default() -> Self {
        Self {
            path: "iperf3".to_string(),
            standard_grace_secs: 10,
            unit_grace_secs: 5,
            pin_cores: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    pub path: String,
    /// Echo requests per probe.
    pub count: u32,
    /// Seconds between echo requests. Values below 0.2 need root on Linux.
    pub interval_secs: f64,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            path: "ping".to_string(),
            count: 100,
            interval_secs: 0.1,
        }
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Parallel streams for the forward/reverse throughput scenario.
    pub throughput_streams: u32,
    /// Parallel streams per endpoint in the multi-endpoint scenario.
    pub multi_az_streams: u32,
    /// Independent units launched by the concurrent load scenario.
    pub concurrent_units: u32,
    /// Suffixes appended to the target to derive the resilience endpoints.
    pub endpoint_suffixes: Vec<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            throughput_streams: 8,
            multi_az_streams: 1,
            concurrent_units: 32,
            endpoint_suffixes: vec!["-az0".to_string(), "-az1".to_string(), "-az2".to_string()],
        }
    }
}

// ---------------------------------------------------------------------------
// Host counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Root under which `proc/` counters are read.
    pub proc_root: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
