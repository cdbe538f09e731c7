//! Harness configuration
//!
//! Loaded from an optional TOML file with `[pool]`, `[connection]` and
//! `[workload]` tables, then overridden by command-line flags.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use cpool_core::{ConnectionParams, PoolConfig};
use log::debug;
use serde::{Deserialize, Serialize};

/// Workload driven against the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Number of worker threads
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Queries issued by each worker
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Rows in the simulated `test_table`
    #[serde(default = "default_table_rows")]
    pub table_rows: u64,

    /// Simulated query latency (milliseconds)
    #[serde(default)]
    pub query_delay_ms: u64,

    /// Make the simulated server refuse the connection for this slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_at_slot: Option<usize>,
}

fn default_threads() -> usize {
    8
}

fn default_iterations() -> usize {
    10
}

fn default_table_rows() -> u64 {
    2000
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            iterations: default_iterations(),
            table_rows: default_table_rows(),
            query_delay_ms: 0,
            fail_at_slot: None,
        }
    }
}

/// Complete harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Pool sizing and deadlines
    #[serde(default)]
    pub pool: PoolConfig,

    /// Parameters handed to the connection factory
    #[serde(default)]
    pub connection: ConnectionParams,

    /// Load generated by the worker threads
    #[serde(default)]
    pub workload: WorkloadConfig,
}

impl HarnessConfig {
    /// Load the configuration from `path`, or use the defaults when no path
    /// is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Check the parts of the configuration the pool does not validate itself.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        anyhow::ensure!(self.workload.threads > 0, "workload.threads must be at least 1");
        anyhow::ensure!(
            self.workload.table_rows > 0,
            "workload.table_rows must be at least 1"
        );
        Ok(())
    }
}
