//! # genrepo-data-sqlx
//!
//! SQLite backend for the genrepo data layer. It depends on [`genrepo-data`]
//! for the storage contract and adds a context that talks to a real database
//! through [SQLx](https://github.com/launchbadge/sqlx).
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqliteContext`] | `StorageContext` over an `sqlx::SqlitePool` |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` → `DataError` (`.into_data_error()`) |
//! | [`SqlxResult<T>`] | Type alias for `Result<T, DataError>` |
//!
//! # Quick start
//!
//! ```ignore
//! use genrepo_data::{DataSourceConfig, GenericRepository, Repository};
//! use genrepo_data_sqlx::SqliteContext;
//!
//! let ctx = SqliteContext::connect(&DataSourceConfig::new("sqlite://app.db")).await?;
//! let users = GenericRepository::<User, _>::new(ctx);
//! users.add(User { id: 1, name: "alice".into() }).await?;
//! ```
//!
//! # Schema
//!
//! Tables are not created for you. Run migrations with `sqlx::migrate!()` or
//! issue DDL through
//! [`execute_sql_raw_command`](genrepo_data::Repository::execute_sql_raw_command).
//!
//! # Error bridging
//!
//! Due to Rust's orphan rules, `From<sqlx::Error> for DataError` can't be
//! implemented here. Use the [`SqlxErrorExt`] trait instead:
//!
//! ```ignore
//! use genrepo_data_sqlx::SqlxErrorExt;
//!
//! let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
//!     .fetch_one(ctx.pool())
//!     .await
//!     .map_err(|e| e.into_data_error())?;
//! ```

mod codec;
pub mod context;
pub mod error;

pub use context::SqliteContext;
pub use error::{SqlxErrorExt, SqlxResult};

/// Re-exports of the most commonly used types from both `genrepo-data` and this crate.
pub mod prelude {
    pub use crate::{SqliteContext, SqlxErrorExt};
    pub use genrepo_data::prelude::*;
}
