mod loader;
pub mod secrets;
pub mod typed;
pub mod value;

use std::collections::HashMap;
use std::path::Path;

pub use secrets::{DefaultSecretResolver, SecretResolver};
pub use typed::ConfigProperties;
pub use value::{ConfigValue, FromConfigValue};

/// Environment variable selecting the active profile.
pub const PROFILE_ENV: &str = "GENREPO_PROFILE";

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
    /// A typed section rejected one of its values.
    Invalid { key: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Invalid { key, message } => {
                write!(f, "Invalid config value for '{key}': {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Layered configuration for genrepo applications.
///
/// Resolution order (lowest to highest priority):
/// 1. `application.yaml`
/// 2. `application-{profile}.yaml`
/// 3. `.env` and `.env.{profile}` (loaded into the process environment, never
///    overwriting variables that are already set)
/// 4. Environment variables: `GENREPO_DATASOURCE_URL` overrides
///    `genrepo.datasource.url`
///
/// `${VAR}`, `${env:VAR}` and `${file:/path}` placeholders in string values
/// are resolved after the YAML layers are merged.
#[derive(Debug, Clone)]
pub struct GenrepoConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl GenrepoConfig {
    /// Load configuration from the current working directory.
    ///
    /// The profile comes from `GENREPO_PROFILE` when set, otherwise `profile`.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."), profile, &DefaultSecretResolver)
    }

    /// Load configuration from `dir` with a custom secret resolver.
    pub fn load_from(
        dir: &Path,
        profile: &str,
        resolver: &dyn SecretResolver,
    ) -> Result<Self, ConfigError> {
        let profile = std::env::var(PROFILE_ENV).unwrap_or_else(|_| profile.to_string());
        let mut values = HashMap::new();

        loader::merge_yaml_file(&dir.join("application.yaml"), &mut values)?;
        loader::merge_yaml_file(&dir.join(format!("application-{profile}.yaml")), &mut values)?;

        // Missing .env files are fine.
        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(format!(".env.{profile}")));

        resolve_placeholders_in(&mut values, resolver)?;
        loader::overlay_env(std::env::vars(), &mut values);

        tracing::debug!(profile = %profile, keys = values.len(), "configuration loaded");
        Ok(Self { values, profile })
    }

    /// Build a config from a YAML document (no files, no environment).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::merge_yaml_str(yaml, &mut values)?;
        Ok(Self {
            values,
            profile: profile.to_string(),
        })
    }

    /// An empty config, mostly useful in tests.
    pub fn empty() -> Self {
        Self {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Typed lookup of a dot-separated key.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Typed lookup that treats a missing key as `None` but still reports
    /// type mismatches.
    pub fn get_opt<V: FromConfigValue>(&self, key: &str) -> Result<Option<V>, ConfigError> {
        match self.values.get(key) {
            None | Some(ConfigValue::Null) => Ok(None),
            Some(value) => V::from_config_value(value, key).map(Some),
        }
    }

    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Construct a typed section from this config.
    pub fn section<C: ConfigProperties>(&self) -> Result<C, ConfigError> {
        C::from_config(self)
    }
}

fn resolve_placeholders_in(
    values: &mut HashMap<String, ConfigValue>,
    resolver: &dyn SecretResolver,
) -> Result<(), ConfigError> {
    for value in values.values_mut() {
        if let ConfigValue::String(s) = value {
            if s.contains("${") {
                *s = secrets::resolve_placeholders(s, resolver)?;
            }
        }
    }
    Ok(())
}
