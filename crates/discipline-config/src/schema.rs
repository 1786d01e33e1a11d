//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub daemon: RawDaemonConfig,

    #[serde(default)]
    pub schedule: RawScheduleConfig,

    #[serde(default)]
    pub executor: RawExecutorConfig,

    #[serde(default)]
    pub safety: RawSafetyConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/discipline/disciplined.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,
}

/// Reconciliation timer settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawScheduleConfig {
    /// Seconds between periodic runs (default 60)
    pub interval_seconds: Option<u64>,

    /// Try the precise timer tier first (default true)
    pub exact_timers: Option<bool>,
}

/// How privileged commands are run
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawExecutorConfig {
    /// argv prefix that runs a shell command with elevated rights,
    /// e.g. `["adb", "shell"]` or `["su", "-c"]`. The command text is
    /// appended as a single final argument.
    pub command_prefix: Option<Vec<String>>,

    /// Package hosting the privileged service; never disabled
    pub host_package: Option<String>,

    /// Command whose success means the executor is ready (default `id`)
    pub readiness_probe: Option<String>,

    /// Per-command timeout in seconds (default 15)
    pub timeout_seconds: Option<u64>,
}

/// Packages that may never be disabled
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSafetyConfig {
    pub own_package: Option<String>,
    pub settings_package: Option<String>,
    pub installer_package: Option<String>,

    /// Additional protected packages
    #[serde(default)]
    pub extra_packages: Vec<String>,
}
