extern crate proc_macro;
use proc_macro::TokenStream;

pub(crate) mod crate_path;
pub(crate) mod entity_derive;
pub(crate) mod mappable_derive;
pub(crate) mod types;

/// Derive `genrepo_data::Entity` for a struct with named fields.
///
/// The struct must also implement `Serialize`, `Deserialize` and `Clone`;
/// column names are the serde field names, so do not rename fields.
///
/// # Struct-level attribute
///
/// | Parameter | Required | Description |
/// |-----------|----------|-------------|
/// | `table`   | no       | Table name. Defaults to the snake_case plural of the struct name (`OrderLine` → `order_lines`) |
///
/// # Field attributes
///
/// | Attribute | Description |
/// |-----------|-------------|
/// | `#[entity(key)]` | Part of the primary key, in declaration order. Without any, a field named `id` is the key. |
/// | `#[entity(relation)]` | Not a column; filled by relation loading. Give it `#[serde(default)]`. |
/// | `#[entity(kind = "json")]` | Override the inferred column kind (`integer`, `real`, `text`, `boolean`, `blob`, `json`). |
///
/// Kinds are inferred from the field type: integers → `Integer`, floats →
/// `Real`, `String`/`char` → `Text`, `bool` → `Boolean`, `Vec<u8>` →
/// `Blob`, anything else → `Json`. `Option<T>` takes the kind of `T`.
///
/// # Example
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, Entity)]
/// #[entity(table = "customers")]
/// pub struct Customer {
///     pub id: i64,
///     pub name: String,
///     pub email: Option<String>,
///     #[entity(relation)]
///     #[serde(default)]
///     pub orders: Vec<Order>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity_derive::expand(input)
}

/// Derive `genrepo_mapper::Mappable` for a struct with named fields.
///
/// Every field is listed with its declared type. `#[mappable(skip)]` leaves
/// a field out of the table (use it together with `#[serde(skip)]`).
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Mappable)]
/// pub struct UserDto {
///     pub id: i64,
///     pub name: String,
///     pub nickname: Option<String>,
/// }
/// ```
#[proc_macro_derive(Mappable, attributes(mappable))]
pub fn derive_mappable(input: TokenStream) -> TokenStream {
    mappable_derive::expand(input)
}
