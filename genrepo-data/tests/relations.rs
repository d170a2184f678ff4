mod common;

use common::*;
use genrepo_data::{DataError, Filter, GenericRepository, Include, Repository};

#[tokio::test]
async fn includes_load_children_per_parent() {
    let (ctx, customers) = seeded(3).await;
    ctx.register_relation(customers_relation()).unwrap();
    let orders = GenericRepository::<Order, _>::new(ctx.clone());
    orders
        .add_range(vec![order(1, 1, 9.5), order(2, 3, 20.0), order(3, 1, 0.5)])
        .await
        .unwrap();

    let loaded = customers
        .get_with_related(Filter::lte("id", 2).into(), Include::new("orders"))
        .await
        .unwrap();

    assert_eq!(loaded.len(), 2);
    let totals: Vec<f64> = loaded[0].orders.iter().map(|o| o.total).collect();
    assert_eq!(totals, vec![9.5, 0.5]);
    assert!(loaded[1].orders.is_empty());

    let third = customers
        .get_first_with_related(Filter::eq("id", 3).into(), Include::new("orders"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third.orders, vec![order(2, 3, 20.0)]);
}

#[tokio::test]
async fn plain_reads_leave_relations_empty() {
    let (ctx, customers) = seeded(1).await;
    ctx.register_relation(customers_relation()).unwrap();
    GenericRepository::<Order, _>::new(ctx.clone())
        .add(order(1, 1, 3.0))
        .await
        .unwrap();

    let c = customers.get_by_id(1).await.unwrap().unwrap();
    assert!(c.orders.is_empty());
}

#[tokio::test]
async fn relation_fields_are_not_persisted() {
    let (ctx, customers) = repo();
    ctx.register_relation(customers_relation()).unwrap();
    let mut c = customer(1);
    c.orders = vec![order(5, 1, 1.0)];
    customers.add(c).await.unwrap();

    let loaded = customers
        .get_first_with_related(Filter::eq("id", 1).into(), Include::new("orders"))
        .await
        .unwrap()
        .unwrap();
    assert!(loaded.orders.is_empty());
}

#[tokio::test]
async fn unknown_include_is_rejected() {
    let (_ctx, customers) = seeded(1).await;
    let err = customers
        .get_with_related(Filter::eq("id", 1).into(), Include::new("invoices"))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::InvalidArgument(ref m) if m.contains("invoices")));
}
