//! Ambient runtime pieces shared by the genrepo crates: layered configuration,
//! tracing setup and the scoped [`ManagedResource`] lifecycle.

pub mod config;
pub mod logging;
pub mod managed;

pub use config::{
    ConfigError, ConfigProperties, ConfigValue, DefaultSecretResolver, FromConfigValue,
    GenrepoConfig, SecretResolver,
};
pub use logging::{init_tracing, init_tracing_with};
pub use managed::ManagedResource;
