use genrepo_macros::Mappable;
use genrepo_mapper::{EntityMapper, FieldDef, FieldType, MapError, MapInto, Mappable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Mappable)]
struct UserRow {
    id: i64,
    name: String,
    age: u8,
    nickname: Option<String>,
    roles: Vec<String>,
    address: Address,
    password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Mappable)]
struct Address {
    city: String,
    zip: Option<u32>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Mappable)]
struct UserDto {
    id: i64,
    name: String,
    age: i32,
    nickname: Option<String>,
    roles: Vec<String>,
    address: Address,
    #[mappable(skip)]
    #[serde(skip)]
    display: String,
}

#[derive(Debug, Serialize, Deserialize, Mappable)]
struct PublicUser {
    id: i64,
    name: String,
    age: u8,
}

#[derive(Debug, Serialize, Deserialize, Mappable)]
struct StrictAge {
    id: i64,
    age: i8,
}

fn row() -> UserRow {
    UserRow {
        id: 7,
        name: "ada".into(),
        age: 36,
        nickname: None,
        roles: vec!["admin".into(), "ops".into()],
        address: Address {
            city: "London".into(),
            zip: Some(12345),
        },
        password_hash: "x".into(),
    }
}

#[test]
fn derived_field_table_lists_declared_types() {
    assert_eq!(
        UserRow::fields(),
        &[
            FieldDef::new("id", FieldType::I64),
            FieldDef::new("name", FieldType::String),
            FieldDef::new("age", FieldType::U8),
            FieldDef::new("nickname", FieldType::Option(&FieldType::String)),
            FieldDef::new("roles", FieldType::List(&FieldType::String)),
            FieldDef::new("address", FieldType::Named("Address")),
            FieldDef::new("password_hash", FieldType::String),
        ]
    );
    assert!(UserDto::field("display").is_none());
    assert_eq!(
        Address::field("zip").map(|f| f.ty),
        Some(FieldType::Option(&FieldType::U32))
    );
}

#[test]
fn maps_between_derived_shapes() {
    let dto: UserDto = EntityMapper::map_to(&row()).unwrap();
    assert_eq!(dto.id, 7);
    assert_eq!(dto.age, 36);
    assert_eq!(dto.roles, vec!["admin".to_string(), "ops".to_string()]);
    assert_eq!(dto.address.zip, Some(12345));
    assert!(dto.display.is_empty());

    let public: PublicUser = row().map_into().unwrap();
    assert_eq!(public.name, "ada");
}

#[test]
fn narrowing_is_a_mapping_error() {
    let err = EntityMapper::map_to::<StrictAge, _>(&row()).unwrap_err();
    assert!(err.is_mapping_error());
    assert!(matches!(err, MapError::IncompatibleField { ref field, .. } if field == "age"));
}

#[test]
fn reverse_mapping_needs_every_target_field() {
    let dto: UserDto = EntityMapper::map_to(&row()).unwrap();
    let err = EntityMapper::map_to::<UserRow, _>(&dto).unwrap_err();
    assert!(matches!(err, MapError::MissingField { ref field, .. } if field == "password_hash"));
}

#[test]
fn lists_map_in_order() {
    let rows: Vec<UserRow> = (1..=3)
        .map(|id| UserRow { id, ..row() })
        .collect();
    let users: Vec<PublicUser> = EntityMapper::map_to_list(&rows).unwrap();
    assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2, 3]);
}
