//! # genrepo-mapper
//!
//! Translates a value of one record shape into another by matching fields of
//! the same name and an assignable type. Typically used to turn
//! storage-native entities into public-facing models and back.
//!
//! Field metadata comes from the [`Mappable`] trait, usually derived with
//! `#[derive(Mappable)]` from `genrepo-macros`. Values travel through
//! `serde_json`, so both shapes must be `Serialize + DeserializeOwned`.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize, Mappable)]
//! struct UserRow { id: i64, name: String, password_hash: String }
//!
//! #[derive(Serialize, Deserialize, Mappable)]
//! struct UserDto { id: i64, name: String }
//!
//! let dto: UserDto = EntityMapper::map_to(&row)?;
//! let dtos: Vec<UserDto> = EntityMapper::map_to_list(&rows)?;
//! ```

pub mod error;
pub mod field;
pub mod mapper;

pub use error::MapError;
pub use field::{short_type_name, FieldDef, FieldType, Mappable};
pub use mapper::{EntityMapper, MapInto};

pub mod prelude {
    //! Re-exports of the mapper's public surface.
    pub use crate::{EntityMapper, FieldDef, FieldType, MapError, MapInto, Mappable};
}
