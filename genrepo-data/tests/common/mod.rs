#![allow(dead_code)]

use genrepo_data::{Column, ColumnKind, Entity, GenericRepository, HasMany, InMemoryContext};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub email: Option<String>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl Entity for Customer {
    fn table_name() -> &'static str {
        "customers"
    }

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("id", ColumnKind::Integer),
            Column::new("name", ColumnKind::Text),
            Column::new("age", ColumnKind::Integer),
            Column::new("email", ColumnKind::Text),
        ];
        COLUMNS
    }

    fn primary_key() -> &'static [&'static str] {
        &["id"]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub total: f64,
}

impl Entity for Order {
    fn table_name() -> &'static str {
        "orders"
    }

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("id", ColumnKind::Integer),
            Column::new("customer_id", ColumnKind::Integer),
            Column::new("total", ColumnKind::Real),
        ];
        COLUMNS
    }

    fn primary_key() -> &'static [&'static str] {
        &["id"]
    }
}

/// Composite key: no single id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: i64,
    pub user: String,
    pub role: String,
}

impl Entity for Membership {
    fn table_name() -> &'static str {
        "memberships"
    }

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("group_id", ColumnKind::Integer),
            Column::new("user", ColumnKind::Text),
            Column::new("role", ColumnKind::Text),
        ];
        COLUMNS
    }

    fn primary_key() -> &'static [&'static str] {
        &["group_id", "user"]
    }
}

/// No primary key declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLine {
    pub message: String,
}

impl Entity for AuditLine {
    fn table_name() -> &'static str {
        "audit_lines"
    }

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[Column::new("message", ColumnKind::Text)];
        COLUMNS
    }

    fn primary_key() -> &'static [&'static str] {
        &[]
    }
}

/// Declares no key; contexts may map one onto `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub code: String,
    pub label: String,
}

impl Entity for Tag {
    fn table_name() -> &'static str {
        "tags"
    }

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("code", ColumnKind::Text),
            Column::new("label", ColumnKind::Text),
        ];
        COLUMNS
    }

    fn primary_key() -> &'static [&'static str] {
        &[]
    }
}

pub fn tag(code: &str, label: &str) -> Tag {
    Tag {
        code: code.into(),
        label: label.into(),
    }
}

pub fn customer(id: i64) -> Customer {
    Customer {
        id,
        name: format!("customer-{id}"),
        age: 18 + (id % 50) as i32,
        email: (id % 2 == 0).then(|| format!("c{id}@example.com")),
        orders: Vec::new(),
    }
}

pub fn order(id: i64, customer_id: i64, total: f64) -> Order {
    Order {
        id,
        customer_id,
        total,
    }
}

pub fn customers_relation() -> HasMany<Customer, Order> {
    HasMany::new(
        "orders",
        "customer_id",
        |c: &Customer| c.id.into(),
        |c, orders| c.orders = orders,
    )
}

pub fn repo() -> (InMemoryContext, GenericRepository<Customer, InMemoryContext>) {
    let ctx = InMemoryContext::new();
    let repo = GenericRepository::new(ctx.clone());
    (ctx, repo)
}

pub async fn seeded(n: i64) -> (InMemoryContext, GenericRepository<Customer, InMemoryContext>) {
    use genrepo_data::Repository;

    let (ctx, repo) = repo();
    repo.add_range((1..=n).map(customer)).await.unwrap();
    (ctx, repo)
}
