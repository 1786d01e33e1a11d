//! Validated daemon configuration

use crate::schema::{
    RawConfig, RawDaemonConfig, RawExecutorConfig, RawSafetyConfig, RawScheduleConfig,
};
use discipline_util::{default_data_dir, default_socket_path, PackageName};
use std::path::PathBuf;
use std::time::Duration;

/// Package id of this application
pub const DEFAULT_OWN_PACKAGE: &str = "com.safe.discipline";
/// Package hosting the privileged shell service
pub const DEFAULT_HOST_PACKAGE: &str = "moe.shizuku.manager";
pub const DEFAULT_SETTINGS_PACKAGE: &str = "com.android.settings";
pub const DEFAULT_INSTALLER_PACKAGE: &str = "com.google.android.packageinstaller";

pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_EXECUTOR_TIMEOUT_SECS: u64 = 15;

/// Validated configuration ready for use by the daemon
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub schedule: ScheduleConfig,
    pub executor: ExecutorConfig,
    pub safety: SafetyConfig,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            daemon: DaemonConfig::from_raw(raw.daemon),
            schedule: ScheduleConfig::from_raw(raw.schedule),
            executor: ExecutorConfig::from_raw(raw.executor),
            safety: SafetyConfig::from_raw(raw.safety),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            data_dir: default_data_dir(),
        }
    }
}

/// Periodic reconciliation timer
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub exact_timers: bool,
}

impl ScheduleConfig {
    fn from_raw(raw: RawScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(raw.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECS)),
            exact_timers: raw.exact_timers.unwrap_or(true),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::from_raw(RawScheduleConfig::default())
    }
}

/// Privileged command channel
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// argv prefix; the shell command is appended as the last argument
    pub command_prefix: Vec<String>,
    pub host_package: PackageName,
    pub readiness_probe: String,
    pub timeout: Duration,
}

impl ExecutorConfig {
    fn from_raw(raw: RawExecutorConfig) -> Self {
        Self {
            command_prefix: raw
                .command_prefix
                .unwrap_or_else(|| vec!["sh".into(), "-c".into()]),
            host_package: PackageName::new(
                raw.host_package.as_deref().unwrap_or(DEFAULT_HOST_PACKAGE).trim(),
            ),
            readiness_probe: raw.readiness_probe.unwrap_or_else(|| "id".into()),
            timeout: Duration::from_secs(
                raw.timeout_seconds.unwrap_or(DEFAULT_EXECUTOR_TIMEOUT_SECS),
            ),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_raw(RawExecutorConfig::default())
    }
}

/// Static part of the protected package set.
///
/// The home launcher is resolved at run time and added by the reconciler.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub own_package: PackageName,
    pub settings_package: PackageName,
    pub installer_package: PackageName,
    pub extra_packages: Vec<PackageName>,
}

impl SafetyConfig {
    fn from_raw(raw: RawSafetyConfig) -> Self {
        let pkg = |value: Option<String>, default: &str| {
            PackageName::new(value.as_deref().unwrap_or(default).trim())
        };

        Self {
            own_package: pkg(raw.own_package, DEFAULT_OWN_PACKAGE),
            settings_package: pkg(raw.settings_package, DEFAULT_SETTINGS_PACKAGE),
            installer_package: pkg(raw.installer_package, DEFAULT_INSTALLER_PACKAGE),
            extra_packages: raw
                .extra_packages
                .iter()
                .map(|p| PackageName::new(p.trim()))
                .collect(),
        }
    }

    /// Every statically protected package, including the executor host
    pub fn protected_packages(&self, host_package: &PackageName) -> Vec<PackageName> {
        let mut packages = vec![
            self.own_package.clone(),
            host_package.clone(),
            self.settings_package.clone(),
            self.installer_package.clone(),
        ];
        packages.extend(self.extra_packages.iter().cloned());
        packages
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self::from_raw(RawSafetyConfig::default())
    }
}
