use super::{ConfigError, GenrepoConfig};

/// A strongly-typed configuration section rooted at a key prefix.
///
/// ```ignore
/// impl ConfigProperties for PoolConfig {
///     fn prefix() -> &'static str { "genrepo.pool" }
///     fn from_config(config: &GenrepoConfig) -> Result<Self, ConfigError> {
///         Ok(Self { size: config.get_or(&Self::key("size"), 5) })
///     }
/// }
/// ```
pub trait ConfigProperties: Sized {
    fn prefix() -> &'static str;

    fn from_config(config: &GenrepoConfig) -> Result<Self, ConfigError>;

    /// Absolute key for a property of this section.
    fn key(property: &str) -> String {
        format!("{}.{property}", Self::prefix())
    }
}
