use genrepo_mapper::{EntityMapper, FieldDef, FieldType, MapError, MapInto, Mappable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AccountRow {
    id: i64,
    name: String,
    age: i32,
    tags: Vec<String>,
    password_hash: String,
}

impl Mappable for AccountRow {
    fn fields() -> &'static [FieldDef] {
        const FIELDS: &[FieldDef] = &[
            FieldDef::new("id", FieldType::I64),
            FieldDef::new("name", FieldType::String),
            FieldDef::new("age", FieldType::I32),
            FieldDef::new("tags", FieldType::List(&FieldType::String)),
            FieldDef::new("password_hash", FieldType::String),
        ];
        FIELDS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AccountDto {
    id: i64,
    name: String,
    age: Option<f64>,
    tags: Vec<String>,
}

impl Mappable for AccountDto {
    fn fields() -> &'static [FieldDef] {
        const FIELDS: &[FieldDef] = &[
            FieldDef::new("id", FieldType::I64),
            FieldDef::new("name", FieldType::String),
            FieldDef::new("age", FieldType::Option(&FieldType::F64)),
            FieldDef::new("tags", FieldType::List(&FieldType::String)),
        ];
        FIELDS
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AuditDto {
    id: i64,
    created_by: String,
}

impl Mappable for AuditDto {
    fn fields() -> &'static [FieldDef] {
        const FIELDS: &[FieldDef] = &[
            FieldDef::new("id", FieldType::I64),
            FieldDef::new("created_by", FieldType::String),
        ];
        FIELDS
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NarrowDto {
    id: i32,
}

impl Mappable for NarrowDto {
    fn fields() -> &'static [FieldDef] {
        const FIELDS: &[FieldDef] = &[FieldDef::new("id", FieldType::I32)];
        FIELDS
    }
}

fn row(id: i64, name: &str) -> AccountRow {
    AccountRow {
        id,
        name: name.to_string(),
        age: 30 + id as i32,
        tags: vec!["a".into(), "b".into()],
        password_hash: "x".into(),
    }
}

#[test]
fn matching_fields_are_copied() {
    let source = row(1, "alice");
    let dto: AccountDto = EntityMapper::map_to(&source).unwrap();
    assert_eq!(dto.id, source.id);
    assert_eq!(dto.name, source.name);
    assert_eq!(dto.age, Some(31.0));
    assert_eq!(dto.tags, source.tags);
}

#[test]
fn missing_target_field_is_a_mapping_error() {
    let err = EntityMapper::map_to::<AuditDto, _>(&row(1, "alice")).unwrap_err();
    assert!(err.is_mapping_error());
    match err {
        MapError::MissingField {
            field,
            source_type,
            target_type,
        } => {
            assert_eq!(field, "created_by");
            assert_eq!(source_type, "AccountRow");
            assert_eq!(target_type, "AuditDto");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn narrowing_is_rejected() {
    let err = EntityMapper::map_to::<NarrowDto, _>(&row(1, "alice")).unwrap_err();
    assert!(matches!(err, MapError::IncompatibleField { ref field, .. } if field == "id"));
    assert!(err.to_string().contains("i64"));
}

#[test]
fn reverse_direction_uses_the_same_contract() {
    // AccountDto.age is Option<f64>; AccountRow.age is i32.
    let dto = AccountDto {
        id: 2,
        name: "bob".into(),
        age: Some(40.0),
        tags: vec![],
    };
    let err = EntityMapper::map_to::<AccountRow, _>(&dto).unwrap_err();
    assert!(err.is_mapping_error());
}

#[test]
fn null_input_is_rejected_before_field_checks() {
    let err = EntityMapper::map_opt::<AuditDto, AccountRow>(None).unwrap_err();
    assert!(matches!(err, MapError::NullInput { .. }));

    let none: Option<AccountRow> = None;
    let err = EntityMapper::map_to::<AuditDto, _>(&none).unwrap_err();
    assert!(matches!(err, MapError::NullInput { .. }));
}

#[test]
fn some_is_mapped_like_the_inner_value() {
    let source = Some(row(3, "carol"));
    let dto: AccountDto = EntityMapper::map_to(&source).unwrap();
    assert_eq!(dto.name, "carol");
}

#[test]
fn list_preserves_order_and_length() {
    let rows = vec![row(1, "a"), row(2, "b"), row(3, "c")];
    let dtos: Vec<AccountDto> = EntityMapper::map_to_list(&rows).unwrap();
    assert_eq!(dtos.len(), 3);
    let names: Vec<_> = dtos.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c"]);
    for (dto, row) in dtos.iter().zip(&rows) {
        assert_eq!(dto.id, row.id);
    }
}

#[test]
fn list_fails_atomically() {
    let rows = vec![Some(row(1, "a")), None, Some(row(3, "c"))];
    let result = EntityMapper::map_to_list::<AccountDto, _>(&rows);
    assert!(matches!(result, Err(MapError::NullInput { .. })));
}

#[test]
fn method_form_matches_associated_form() {
    let dto: AccountDto = row(4, "dave").map_into().unwrap();
    assert_eq!(dto.id, 4);
}
