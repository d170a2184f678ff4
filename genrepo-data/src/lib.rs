//! # genrepo-data
//!
//! A generic repository over any [`Entity`], backed by a pluggable
//! [`StorageContext`].
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Entity`] | Declarative table, column and primary-key metadata |
//! | [`Repository`] | The uniform CRUD, query, aggregate and transaction contract |
//! | [`GenericRepository`] | Its implementation, generic over record and context |
//! | [`StorageContext`] | The storage collaborator contract |
//! | [`InMemoryContext`] | In-process context with unit-of-work saves and snapshot transactions |
//! | [`Predicate`] / [`Filter`] | Record tests, translatable when built from filters |
//! | [`Selector`] / [`OrderBy`] | Field projections for ordering and aggregation |
//! | [`QueryBuilder`] | SQL generation from filters for SQL contexts |
//! | [`TransactionScope`] | Scoped transaction implementing `ManagedResource` |
//!
//! # Quick start
//!
//! ```ignore
//! use genrepo_data::prelude::*;
//!
//! let ctx = InMemoryContext::new();
//! let users = GenericRepository::<User, _>::new(ctx);
//!
//! users.add(User { id: 1, name: "alice".into(), age: 30 }).await?;
//! let adults = users.get_where(Filter::gte("age", 18).into()).await?;
//! let oldest = users.max(Selector::column("age", |u: &User| u.age)).await?;
//!
//! users
//!     .execute_transaction(|repo| async move {
//!         repo.remove_by_id(1).await?;
//!         Ok::<_, DataError>(())
//!     })
//!     .await?;
//! ```

pub mod config;
pub mod context;
pub mod criteria;
pub mod entity;
pub mod error;
pub mod filter;
pub mod generic;
pub mod memory;
pub mod page;
pub mod predicate;
pub mod query;
pub mod relation;
pub mod repository;
pub mod transaction;

pub use config::{DataSourceConfig, RepositoryConfig};
pub use context::StorageContext;
pub use criteria::Query;
pub use entity::{record_fields, Column, ColumnKind, Entity, Key};
pub use error::{BoxError, DataError};
pub use filter::{Condition, Filter};
pub use generic::GenericRepository;
pub use memory::InMemoryContext;
pub use page::{Page, Pageable};
pub use predicate::{Aggregate, Include, Numeric, OrderBy, Predicate, Selector, Tracking};
pub use query::{Dialect, IdentifierPolicy, QueryBuilder, QueryError};
pub use relation::{HasMany, RelationLoader, RelationRegistry};
pub use repository::Repository;
pub use transaction::TransactionScope;

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        DataError, Entity, Filter, GenericRepository, HasMany, Include, InMemoryContext, Key,
        OrderBy, Page, Pageable, Predicate, Query, Repository, Selector, StorageContext, Tracking,
    };
}
