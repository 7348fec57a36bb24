use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Blob storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Flat directory holding uploaded images. Default: "./uploads".
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
        }
    }
}

/// How product reads treat records whose images are missing from the blob store.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Hide products with no surviving image.
    Strict,
    /// Return everything without touching the blob store.
    #[default]
    Permissive,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DisplayConfig {
    #[serde(default)]
    pub mode: DisplayMode,
}

/// Orphan sweep configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    /// Blobs modified more recently than this are never swept. Default: 3600.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Interval between scheduled sweeps; 0 disables the scheduler. Default: 0.
    #[serde(default)]
    pub schedule_interval_secs: u64,
    /// Upper bound on a single sweep before it is cancelled. Default: 600.
    #[serde(default = "default_sweep_timeout_secs")]
    pub sweep_timeout_secs: u64,
    /// Records deleted per bulk delete call. Default: 100.
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
    /// Report what would be deleted without deleting. Default: false.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_grace_period_secs() -> u64 {
    3600
}
fn default_sweep_timeout_secs() -> u64 {
    600
}
fn default_delete_batch_size() -> usize {
    100
}

impl MaintenanceConfig {
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.grace_period_secs).unwrap_or(i64::MAX))
    }

    pub fn sweep_timeout(&self) -> Duration {
        Duration::from_secs(self.sweep_timeout_secs)
    }

    /// `None` when scheduled sweeps are disabled.
    pub fn schedule_interval(&self) -> Option<Duration> {
        (self.schedule_interval_secs > 0).then(|| Duration::from_secs(self.schedule_interval_secs))
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            schedule_interval_secs: 0,
            sweep_timeout_secs: default_sweep_timeout_secs(),
            delete_batch_size: default_delete_batch_size(),
            dry_run: false,
        }
    }
}

/// Inventory log append retry configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    /// Retries after the first failed append. Default: 5.
    #[serde(default = "default_audit_max_retries")]
    pub max_retries: u8,
    /// Default: 50.
    #[serde(default = "default_audit_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Default: 2000.
    #[serde(default = "default_audit_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_audit_max_retries() -> u8 {
    5
}
fn default_audit_base_delay_ms() -> u64 {
    50
}
fn default_audit_max_delay_ms() -> u64 {
    2000
}

impl AuditConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_retries: default_audit_max_retries(),
            base_delay_ms: default_audit_base_delay_ms(),
            max_delay_ms: default_audit_max_delay_ms(),
        }
    }
}
