//! genrepo: a generic async repository layer.
//!
//! This facade crate re-exports the genrepo sub-crates through a single
//! dependency with feature flags. Import everything you need with:
//!
//! ```ignore
//! use genrepo::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature  | Default | Crate                                  |
//! |----------|---------|----------------------------------------|
//! | `data`   | **yes** | `genrepo-data` (repository, contexts)  |
//! | `mapper` | **yes** | `genrepo-mapper`                       |
//! | `sqlite` | no      | `genrepo-data-sqlx`                    |
//! | `full`   | no      | All of the above                       |
//!
//! `#[derive(Entity)]` needs `data`, `#[derive(Mappable)]` needs `mapper`.

// The derives use `proc-macro-crate` to detect whether the user depends on
// `genrepo` or on the individual crates, and emit `genrepo::genrepo_data`
// or `genrepo_data` paths accordingly.
pub extern crate genrepo_core;
pub extern crate genrepo_macros;

pub use genrepo_core::*;
pub use genrepo_macros::{Entity, Mappable};

#[cfg(feature = "data")]
pub use genrepo_data;

#[cfg(feature = "mapper")]
pub use genrepo_mapper;

#[cfg(feature = "sqlite")]
pub use genrepo_data_sqlx;

/// Unified prelude: `use genrepo::prelude::*`.
pub mod prelude {
    pub use genrepo_core::{ConfigProperties, GenrepoConfig, ManagedResource};
    pub use genrepo_macros::{Entity, Mappable};

    #[cfg(feature = "data")]
    pub use genrepo_data::prelude::*;

    #[cfg(feature = "mapper")]
    pub use genrepo_mapper::prelude::*;

    #[cfg(feature = "sqlite")]
    pub use genrepo_data_sqlx::prelude::*;
}
