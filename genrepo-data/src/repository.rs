use std::future::Future;

use serde_json::Value;

use crate::entity::{Entity, Key};
use crate::error::{BoxError, DataError};
use crate::page::{Page, Pageable};
use crate::predicate::{Include, Numeric, OrderBy, Predicate, Selector, Tracking};

/// Uniform data-access contract over one record type.
///
/// Every mutating operation ends with exactly one autosave and returns the
/// rows it affected. Input is validated in full before anything is staged,
/// so a rejected call writes nothing.
///
/// A missing record is `None`: single-record writes take
/// `impl Into<Option<T>>`, batch writes take items convertible to
/// `Option<T>`.
///
/// Only the asynchronous form exists. Synchronous callers block at the call
/// site (for example with `Runtime::block_on`).
///
/// Uses RPITIT (return-position `impl Trait` in traits), no `async-trait`.
pub trait Repository<T: Entity>: Clone + Send + Sync {
    /// `None` if absent. Fails with `InvalidArgument` when `id <= 0`.
    fn get_by_id(&self, id: i64) -> impl Future<Output = Result<Option<T>, DataError>> + Send;

    /// Lookup by a full (possibly composite) key.
    fn get_by_key(&self, key: Key) -> impl Future<Output = Result<Option<T>, DataError>> + Send;

    fn get_all(&self, tracking: Tracking) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn get_first(
        &self,
        predicate: Predicate<T>,
    ) -> impl Future<Output = Result<Option<T>, DataError>> + Send;

    fn get_where(
        &self,
        predicate: Predicate<T>,
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn get_first_with_related(
        &self,
        predicate: Predicate<T>,
        include: Include<T>,
    ) -> impl Future<Output = Result<Option<T>, DataError>> + Send;

    fn get_with_related(
        &self,
        predicate: Predicate<T>,
        include: Include<T>,
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn exists(&self, predicate: Predicate<T>) -> impl Future<Output = Result<bool, DataError>> + Send;

    /// `true` iff no record exists.
    fn is_empty(&self) -> impl Future<Output = Result<bool, DataError>> + Send;

    fn count(&self) -> impl Future<Output = Result<u64, DataError>> + Send;

    fn count_where(&self, predicate: Predicate<T>) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Fails with `EmptySequence` when there are no records.
    fn max<V: Numeric>(&self, selector: Selector<T, V>) -> impl Future<Output = Result<V, DataError>> + Send;

    fn max_where<V: Numeric>(
        &self,
        selector: Selector<T, V>,
        predicate: Predicate<T>,
    ) -> impl Future<Output = Result<V, DataError>> + Send;

    fn min<V: Numeric>(&self, selector: Selector<T, V>) -> impl Future<Output = Result<V, DataError>> + Send;

    fn min_where<V: Numeric>(
        &self,
        selector: Selector<T, V>,
        predicate: Predicate<T>,
    ) -> impl Future<Output = Result<V, DataError>> + Send;

    fn sum<V: Numeric>(&self, selector: Selector<T, V>) -> impl Future<Output = Result<V, DataError>> + Send;

    fn sum_where<V: Numeric>(
        &self,
        selector: Selector<T, V>,
        predicate: Predicate<T>,
    ) -> impl Future<Output = Result<V, DataError>> + Send;

    fn average<V: Numeric>(
        &self,
        selector: Selector<T, V>,
    ) -> impl Future<Output = Result<f64, DataError>> + Send;

    fn average_where<V: Numeric>(
        &self,
        selector: Selector<T, V>,
        predicate: Predicate<T>,
    ) -> impl Future<Output = Result<f64, DataError>> + Send;

    fn get_ordered(
        &self,
        order: OrderBy<T>,
        tracking: Tracking,
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    /// `skip((page - 1) * size).take(size)` over the optionally ordered set.
    /// Fails with `InvalidArgument` when `page` or `size` is not positive.
    fn get_paged(
        &self,
        page: i64,
        size: i64,
        order: Option<OrderBy<T>>,
        tracking: Tracking,
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    /// Like [`get_paged`](Repository::get_paged), with totals.
    fn get_page(
        &self,
        pageable: &Pageable,
        order: Option<OrderBy<T>>,
    ) -> impl Future<Output = Result<Page<T>, DataError>> + Send;

    /// Fails with `NullEntity` on `None`.
    fn add(&self, record: impl Into<Option<T>>) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Fails with `NullEntityInCollection` on a `None` member.
    fn add_range<I>(&self, records: I) -> impl Future<Output = Result<u64, DataError>> + Send
    where
        I: IntoIterator,
        I::Item: Into<Option<T>>;

    /// Copies every field of `record` onto the stored record with the same
    /// key. Fails with `NullEntity`, `NullPrimaryKey` or `EntityNotFound`.
    fn update(&self, record: impl Into<Option<T>>) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Loads by id and applies `action` in place. Nothing is written when
    /// the id does not exist.
    fn update_by_id<F>(&self, id: i64, action: F) -> impl Future<Output = Result<u64, DataError>> + Send
    where
        F: FnOnce(&mut T) + Send;

    /// Fails with `InvalidArgument` on an empty collection.
    fn update_range<I>(&self, records: I) -> impl Future<Output = Result<u64, DataError>> + Send
    where
        I: IntoIterator,
        I::Item: Into<Option<T>>;

    fn update_where<F>(
        &self,
        predicate: Predicate<T>,
        action: F,
    ) -> impl Future<Output = Result<u64, DataError>> + Send
    where
        F: FnMut(&mut T) + Send;

    /// The record must exist. Fails with `NullEntity`, `NullPrimaryKey` or
    /// `EntityNotFound`.
    fn remove(&self, record: impl Into<Option<T>>) -> impl Future<Output = Result<u64, DataError>> + Send;

    fn remove_by_id(&self, id: i64) -> impl Future<Output = Result<u64, DataError>> + Send;

    fn remove_range<I>(&self, records: I) -> impl Future<Output = Result<u64, DataError>> + Send
    where
        I: IntoIterator,
        I::Item: Into<Option<T>>;

    fn remove_where(&self, predicate: Predicate<T>) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Run `action` in a transaction, autosave, then commit. Any failure
    /// (including a panic inside `action`) rolls back and is returned as
    /// `TransactionFailed` carrying the original message. Cancellation rolls
    /// back and is returned as `Cancelled`.
    fn execute_transaction<F, Fut, E>(&self, action: F) -> impl Future<Output = Result<(), DataError>> + Send
    where
        F: FnOnce(Self) -> Fut + Send,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Into<BoxError> + Send;

    /// Fails with `EmptyQuery` on blank SQL.
    fn execute_sql_raw(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn execute_sql_raw_command(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<u64, DataError>> + Send;
}
