//! Typed configuration sections consumed by repositories and SQL contexts.
//!
//! ```yaml
//! genrepo:
//!   datasource:
//!     url: "sqlite://app.db"
//!     max_connections: 5
//!     acquire_timeout_secs: 30
//!   repository:
//!     tracking: no-tracking
//!     max_page_size: 500
//! ```

use std::time::Duration;

use genrepo_core::{ConfigError, ConfigProperties, ConfigValue, FromConfigValue, GenrepoConfig};

use crate::predicate::Tracking;

impl FromConfigValue for Tracking {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        let raw = String::from_config_value(value, key)?;
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "tracking" | "tracked" => Ok(Tracking::Tracking),
            "no-tracking" | "notracking" | "untracked" => Ok(Tracking::NoTracking),
            _ => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "tracking | no-tracking",
            }),
        }
    }
}

/// Defaults applied by a [`GenericRepository`](crate::GenericRepository).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryConfig {
    /// Tracking mode for reads that do not take an explicit flag.
    pub tracking: Tracking,
    /// Upper bound on page size; larger pages are rejected.
    pub max_page_size: Option<u64>,
}

impl ConfigProperties for RepositoryConfig {
    fn prefix() -> &'static str {
        "genrepo.repository"
    }

    fn from_config(config: &GenrepoConfig) -> Result<Self, ConfigError> {
        let max_page_size: Option<u64> = config.get_opt(&Self::key("max_page_size"))?;
        if max_page_size == Some(0) {
            return Err(ConfigError::Invalid {
                key: Self::key("max_page_size"),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            tracking: config.get_opt(&Self::key("tracking"))?.unwrap_or_default(),
            max_page_size,
        })
    }
}

/// Connection settings for SQL storage contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DataSourceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl ConfigProperties for DataSourceConfig {
    fn prefix() -> &'static str {
        "genrepo.datasource"
    }

    fn from_config(config: &GenrepoConfig) -> Result<Self, ConfigError> {
        let url: String = config.get(&Self::key("url"))?;
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: Self::key("url"),
                message: "must not be empty".to_string(),
            });
        }
        let max_connections: u32 = config.get_opt(&Self::key("max_connections"))?.unwrap_or(5);
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: Self::key("max_connections"),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            url,
            max_connections,
            acquire_timeout: config
                .get_opt(&Self::key("acquire_timeout_secs"))?
                .unwrap_or(Duration::from_secs(30)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_defaults() {
        let config = GenrepoConfig::empty().section::<RepositoryConfig>().unwrap();
        assert_eq!(config, RepositoryConfig::default());
        assert_eq!(config.tracking, Tracking::NoTracking);
    }

    #[test]
    fn repository_from_yaml() {
        let yaml = "genrepo:\n  repository:\n    tracking: Tracking\n    max_page_size: 50\n";
        let config: RepositoryConfig = GenrepoConfig::from_yaml_str(yaml, "dev")
            .unwrap()
            .section()
            .unwrap();
        assert_eq!(config.tracking, Tracking::Tracking);
        assert_eq!(config.max_page_size, Some(50));
    }

    #[test]
    fn unknown_tracking_mode_is_a_mismatch() {
        let yaml = "genrepo:\n  repository:\n    tracking: sometimes\n";
        let err = GenrepoConfig::from_yaml_str(yaml, "dev")
            .unwrap()
            .section::<RepositoryConfig>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn datasource_requires_url() {
        let err = GenrepoConfig::empty().section::<DataSourceConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(ref k) if k == "genrepo.datasource.url"));
    }

    #[test]
    fn datasource_defaults_and_overrides() {
        let yaml = "genrepo:\n  datasource:\n    url: \"sqlite::memory:\"\n    acquire_timeout_secs: 2\n";
        let config: DataSourceConfig = GenrepoConfig::from_yaml_str(yaml, "dev")
            .unwrap()
            .section()
            .unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.acquire_timeout, Duration::from_secs(2));
    }
}
