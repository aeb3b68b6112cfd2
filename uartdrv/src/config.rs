use crate::{DriverError, Result};
use dataport::{region_size_for, OverflowPlacement};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration file of the driver process.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub path: Option<PathBuf>,
}

/// Construction-time knobs of the data plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Upper bound on bytes pulled from the device per read.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Bytes the backup queue can hold; 0 disables it.
    #[serde(default = "default_backup_queue_size")]
    pub backup_queue_size: usize,

    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    #[serde(default)]
    pub mode: DrainMode,

    #[serde(default)]
    pub write_policy: WritePolicy,

    #[serde(default)]
    pub overflow_placement: OverflowPlacement,

    #[serde(default = "default_port_size")]
    pub inbound_size: usize,

    #[serde(default = "default_port_size")]
    pub outbound_size: usize,

    #[serde(default)]
    pub yield_after_notify: bool,

    /// Received bytes between two statistics log lines.
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

/// What the drain engine does with hardware data while the overflow flag is
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Keep reading and discarding so the device FIFO never locks up.
    #[default]
    Drain,
    /// Leave the device alone until the flag is cleared.
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrainMode {
    /// Read into a staging chunk, then route through the backup queue or
    /// the shared ring.
    #[default]
    Staged,
    /// Read straight into the ring's free window and stop when it is full,
    /// leaving the rest in the device.
    Direct,
}

/// How an outbound write treats a device that accepts fewer bytes than
/// requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Offer the data once and report a short write as an error. The tail
    /// of the request is lost.
    #[default]
    ReportShort,
    /// Keep offering the remainder until the device took all of it. Blocks
    /// for as long as the device refuses data.
    Retry,
}

fn default_read_chunk_size() -> usize {
    64
}

fn default_backup_queue_size() -> usize {
    256
}

fn default_port_size() -> usize {
    4096
}

fn default_stats_interval() -> u64 {
    1 << 20
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            read_chunk_size: default_read_chunk_size(),
            backup_queue_size: default_backup_queue_size(),
            overflow_policy: OverflowPolicy::default(),
            mode: DrainMode::default(),
            write_policy: WritePolicy::default(),
            overflow_placement: OverflowPlacement::default(),
            inbound_size: default_port_size(),
            outbound_size: default_port_size(),
            yield_after_notify: false,
            stats_interval: default_stats_interval(),
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            return Err(DriverError::InvalidConfig(
                "read_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.mode == DrainMode::Direct && self.backup_queue_size > 0 {
            return Err(DriverError::InvalidConfig(
                "direct mode does not use a backup queue, set backup_queue_size = 0".to_string(),
            ));
        }
        let minimum = region_size_for(1, self.overflow_placement);
        if self.inbound_size < minimum {
            return Err(DriverError::InvalidConfig(format!(
                "inbound_size {} is below the minimum of {} bytes",
                self.inbound_size, minimum
            )));
        }
        if self.outbound_size == 0 {
            return Err(DriverError::InvalidConfig(
                "outbound_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
