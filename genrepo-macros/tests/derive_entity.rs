use genrepo_data::{ColumnKind, DataError, Entity, Filter, GenericRepository, InMemoryContext, Repository};
use genrepo_macros::Entity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
struct OrderLine {
    id: i64,
    sku: String,
    quantity: u32,
    price: f64,
    gift: bool,
    note: Option<String>,
    thumbnail: Vec<u8>,
    tags: Vec<String>,
    #[entity(relation)]
    #[serde(default)]
    discounts: Vec<Discount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "discount_codes")]
struct Discount {
    #[entity(key)]
    code: String,
    #[entity(key)]
    line_id: i64,
    #[entity(kind = "text")]
    amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
struct Category {
    name: String,
}

#[test]
fn default_table_is_snake_case_plural() {
    assert_eq!(OrderLine::table_name(), "order_lines");
    assert_eq!(Category::table_name(), "categories");
    assert_eq!(Discount::table_name(), "discount_codes");
}

#[test]
fn column_kinds_follow_field_types() {
    let kinds: Vec<(&str, ColumnKind)> = OrderLine::columns()
        .iter()
        .map(|c| (c.name, c.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("id", ColumnKind::Integer),
            ("sku", ColumnKind::Text),
            ("quantity", ColumnKind::Integer),
            ("price", ColumnKind::Real),
            ("gift", ColumnKind::Boolean),
            ("note", ColumnKind::Text),
            ("thumbnail", ColumnKind::Blob),
            ("tags", ColumnKind::Json),
        ]
    );
    assert!(OrderLine::column("discounts").is_none());
    assert_eq!(Discount::column("amount").map(|c| c.kind), Some(ColumnKind::Text));
}

#[test]
fn primary_key_convention() {
    assert_eq!(OrderLine::primary_key(), &["id"]);
    assert_eq!(Discount::primary_key(), &["code", "line_id"]);
    assert!(Category::primary_key().is_empty());
}

fn line(id: i64, quantity: u32) -> OrderLine {
    OrderLine {
        id,
        sku: format!("SKU-{id}"),
        quantity,
        price: 2.5 * id as f64,
        gift: id % 2 == 0,
        note: None,
        thumbnail: vec![0xde, 0xad],
        tags: vec!["new".into()],
        discounts: Vec::new(),
    }
}

#[tokio::test]
async fn derived_entity_works_with_the_repository() {
    let repo = GenericRepository::<OrderLine, _>::new(InMemoryContext::new());
    repo.add_range((1..=4).map(|id| line(id, id as u32 * 3))).await.unwrap();

    let found = repo.get_by_id(2).await.unwrap().unwrap();
    assert_eq!(found, line(2, 6));

    let bulk = repo.count_where(Filter::gte("quantity", 6).into()).await.unwrap();
    assert_eq!(bulk, 3);

    let changed = repo
        .update_where(Filter::eq("gift", true).into(), |l| l.note = Some("wrap".into()))
        .await
        .unwrap();
    assert_eq!(changed, 2);
    let wrapped = repo
        .get_where(Filter::is_not_null("note").into())
        .await
        .unwrap();
    assert_eq!(wrapped.iter().map(|l| l.id).collect::<Vec<_>>(), vec![2, 4]);
}

#[tokio::test]
async fn keyless_derived_entity_cannot_be_updated() {
    let repo = GenericRepository::<Category, _>::new(InMemoryContext::new());

    let err = repo
        .update(Category { name: "books".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::NullPrimaryKey { .. }), "{err}");
}
