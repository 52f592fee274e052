//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use jobprep_session::SessionConfig;

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the store; `None` keeps it in memory
    pub database_path: Option<PathBuf>,
    /// Session timing and synchronisation
    pub session: SessionConfig,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: Some(data_dir.join("jobprep.db")),
            session: SessionConfig::default(),
        }
    }

    /// A configuration whose store lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            database_path: None,
            session: SessionConfig::default(),
        }
    }

    /// Read a JSON configuration file; missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let session = &self.session;
        if session.session_duration.is_zero() {
            return Err(CoreError::Config("session_duration must be positive".to_string()));
        }
        if session.activity_check_interval.is_zero() {
            return Err(CoreError::Config(
                "activity_check_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn data_dir() -> PathBuf {
        local_data_dir()
            .map(|d| d.join("JobPrep"))
            .unwrap_or_else(|| PathBuf::from(".jobprep"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

/// Per-user application data directory for the current platform.
fn local_data_dir() -> Option<PathBuf> {
    let from_env = |var: &str| std::env::var_os(var).map(PathBuf::from);

    if cfg!(target_os = "windows") {
        from_env("LOCALAPPDATA")
    } else if cfg!(target_os = "macos") {
        from_env("HOME").map(|home| home.join("Library/Application Support"))
    } else if cfg!(target_os = "linux") {
        from_env("XDG_DATA_HOME").or_else(|| from_env("HOME").map(|home| home.join(".local/share")))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"session": {{"inactivity_timeout": 300000, "sync_across_tabs": false}}}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.database_path, Config::default().database_path);
        assert_eq!(config.session.inactivity_timeout, Duration::from_secs(300));
        assert!(!config.session.sync_across_tabs);
        assert!(config.session.extend_on_activity);
    }

    #[test]
    fn test_null_database_path_means_in_memory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"database_path": null}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_default_places_database_in_data_dir() {
        let config = Config::default();
        let path = config.database_path.unwrap();
        assert!(path.starts_with(Config::data_dir()));
        assert!(path.ends_with("jobprep.db"));
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"session": {{"activity_check_interval": 0}}}}"#).unwrap();

        assert!(matches!(
            Config::load(file.path()),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_new_places_database_in_data_dir() {
        let config = Config::new(PathBuf::from("/tmp/jp"));
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/tmp/jp/jobprep.db"))
        );
    }
}
