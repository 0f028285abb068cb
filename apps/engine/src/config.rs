use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::{validate_concurrency, validate_timeout};

/// Environment variable that overrides `database.path`.
pub const DATABASE_ENV: &str = "PULSECHECK_DATABASE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },
    #[error("Failed to write config file {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },
    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("No config directory available (neither XDG_CONFIG_HOME nor HOME is set)")]
    ConfigPathUnavailable,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub probe: ProbeConfig,
    pub ssl: SslConfig,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Services probed at once. 1 keeps the pass sequential.
    pub concurrency: usize,
    /// Stop starting new services after this many seconds. Unset means no budget.
    pub time_budget_seconds: Option<u64>,
    /// Stored on every check as `check_region`.
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "pulsecheck.db".into(), pool_size: 8 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: concat!("pulsecheck/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for SslConfig {
    fn default() -> Self {
        Self { timeout_seconds: 5 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { concurrency: 1, time_budget_seconds: None, region: "default".into() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8080 }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl SslConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl SchedulerConfig {
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_seconds.map(Duration::from_secs)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pulsecheck/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("pulsecheck/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let budget = self
            .scheduler
            .time_budget_seconds
            .map(|secs| format!("{secs}s"))
            .unwrap_or_else(|| "none".into());

        writeln!(f, "Current Engine Configuration:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Pool Size", &self.database.pool_size)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout", &format!("{}s", self.probe.timeout_seconds))?;
        write_1(f, "User Agent", &self.probe.user_agent)?;
        write_title_1(f, "SSL")?;
        write_1(f, "Timeout", &format!("{}s", self.ssl.timeout_seconds))?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Concurrency", &self.scheduler.concurrency)?;
        write_1(f, "Time Budget", &budget)?;
        write_1(f, "Region", &self.scheduler.region)?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pulsecheck/config.toml
    ///  or the specified path, with the name config.toml if one does not exist.
    /// `PULSECHECK_DATABASE` overrides the database path either way.
    ///
    /// ```no_run
    /// use pulsecheck_engine::config::Config;
    ///
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), pulsecheck_engine::config::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let mut config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str::<Self>(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        if let Ok(database_path) = env::var(DATABASE_ENV) {
            if !database_path.trim().is_empty() {
                config.database.path = database_path;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout(self.probe.timeout_seconds)
            .map_err(|e| ConfigError::Invalid(format!("probe.timeout_seconds: {e}")))?;
        validate_timeout(self.ssl.timeout_seconds)
            .map_err(|e| ConfigError::Invalid(format!("ssl.timeout_seconds: {e}")))?;
        validate_concurrency(self.scheduler.concurrency)
            .map_err(|e| ConfigError::Invalid(format!("scheduler.concurrency: {e}")))?;
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid("database.pool_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.probe.timeout(), Duration::from_secs(10));
        assert_eq!(config.ssl.timeout(), Duration::from_secs(5));
        assert_eq!(config.scheduler.concurrency, 1);
        assert!(config.scheduler.time_budget().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/pulsecheck");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.scheduler.region, "default");
        assert!(dir.path().join("nested/pulsecheck.toml").exists());
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\nconcurrency = 4\nregion = \"eu-west\"\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.scheduler.concurrency, 4);
        assert_eq!(config.scheduler.region, "eu-west");
        assert_eq!(config.probe.timeout_seconds, 10);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\nconcurrency = 0\n").unwrap();
        assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::Invalid(_))));

        fs::write(&path, "[probe]\ntimeout_seconds = 0\n").unwrap();
        assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_display_mentions_every_section() {
        let rendered = Config::default().to_string();
        for section in ["Database", "Probe", "SSL", "Scheduler", "Server"] {
            assert!(rendered.contains(section), "missing {section}");
        }
    }
}
