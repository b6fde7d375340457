//! Typed runtime configuration.
//!
//! # Responsibility
//! - Describe logger, storage, queue and scheduler settings.
//! - Parse configuration from YAML with defaults for every section.
//!
//! # Invariants
//! - A missing section or key falls back to its documented default.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_QUEUE_NAME: &str = "notifications";
pub const DEFAULT_NOTIFY_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_RETENTION_INTERVAL_SECS: u64 = 10 * 60;
pub const DEFAULT_RETENTION_MONTHS: u32 = 12;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config file: {err}"),
            Self::Yaml(err) => write!(f, "failed to parse config file: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Yaml(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

/// Root configuration shared by the calendar processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl CalendarConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Absolute directory for rolling log files. Logging stays off when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

/// Event store variant selected at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    Memory,
    Sqlite,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub kind: StorageKind,
    /// SQLite database file; an in-memory database is used when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_name")]
    pub name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_notify_interval_secs")]
    pub notify_interval_secs: u64,
    #[serde(default = "default_retention_interval_secs")]
    pub retention_interval_secs: u64,
    /// Events ending more than this many months ago are purged.
    #[serde(default = "default_retention_months")]
    pub retention_months: u32,
}

impl SchedulerConfig {
    pub fn notify_interval(&self) -> Duration {
        Duration::from_secs(self.notify_interval_secs)
    }

    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            notify_interval_secs: default_notify_interval_secs(),
            retention_interval_secs: default_retention_interval_secs(),
            retention_months: default_retention_months(),
        }
    }
}

fn default_log_level() -> String {
    crate::logging::default_log_level().to_string()
}

fn default_queue_name() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

fn default_notify_interval_secs() -> u64 {
    DEFAULT_NOTIFY_INTERVAL_SECS
}

fn default_retention_interval_secs() -> u64 {
    DEFAULT_RETENTION_INTERVAL_SECS
}

fn default_retention_months() -> u32 {
    DEFAULT_RETENTION_MONTHS
}

#[cfg(test)]
mod tests {
    use super::{CalendarConfig, StorageKind, DEFAULT_QUEUE_NAME};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CalendarConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.storage.kind, StorageKind::Memory);
        assert_eq!(config.queue.name, DEFAULT_QUEUE_NAME);
        assert_eq!(config.scheduler.notify_interval(), Duration::from_secs(30));
        assert_eq!(config.scheduler.retention_interval(), Duration::from_secs(600));
        assert_eq!(config.scheduler.retention_months, 12);
    }

    #[test]
    fn parses_sqlite_storage_and_overrides() {
        let config = CalendarConfig::from_yaml_str(
            "logger:\n  level: warn\nstorage:\n  kind: sqlite\n  path: /var/lib/calendar/events.db\nqueue:\n  name: reminders\nscheduler:\n  notify_interval_secs: 5\n",
        )
        .unwrap();

        assert_eq!(config.logger.level, "warn");
        assert_eq!(config.storage.kind, StorageKind::Sqlite);
        assert_eq!(
            config.storage.path,
            Some(PathBuf::from("/var/lib/calendar/events.db"))
        );
        assert_eq!(config.queue.name, "reminders");
        assert_eq!(config.scheduler.notify_interval_secs, 5);
        assert_eq!(config.scheduler.retention_interval_secs, 600);
    }

    #[test]
    fn unknown_storage_kind_is_rejected() {
        let err = CalendarConfig::from_yaml_str("storage:\n  kind: postgres\n").unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.yaml");
        std::fs::write(&path, "queue:\n  name: from-file\n").unwrap();

        let config = CalendarConfig::load(&path).unwrap();
        assert_eq!(config.queue.name, "from-file");
    }
}
