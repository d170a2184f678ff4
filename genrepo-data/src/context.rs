use std::future::Future;

use serde_json::Value;

use crate::criteria::Query;
use crate::entity::{no_primary_key, Entity, Key};
use crate::error::DataError;
use crate::filter::Filter;
use crate::predicate::{mean, Aggregate, Numeric, Predicate, Selector, Tracking};

/// The storage collaborator a [`GenericRepository`](crate::GenericRepository)
/// runs against.
///
/// Reads and transaction control are asynchronous. Writes are staged
/// synchronously (`add`, `update`, `remove`, ...) and reach storage on the
/// next [`save`](StorageContext::save), which reports the affected rows.
///
/// A context is a cheap handle around shared state; methods take `&self`
/// and use interior mutability. One context is meant for one logical unit
/// of work at a time.
///
/// Uses RPITIT (return-position `impl Trait` in traits), no `async-trait`.
pub trait StorageContext: Send + Sync + 'static {
    /// Declared primary-key fields of `T`; none is a configuration error.
    fn primary_key_fields<T: Entity>(&self) -> Result<&'static [&'static str], DataError> {
        match T::primary_key() {
            [] => Err(no_primary_key::<T>()),
            fields => Ok(fields),
        }
    }

    /// Key of `record` over the fields named by
    /// [`primary_key_fields`](StorageContext::primary_key_fields).
    fn key_of<T: Entity>(&self, record: &T) -> Result<Key, DataError> {
        Key::of_named::<T>(self.primary_key_fields::<T>()?, record)
    }

    /// Equality filter selecting the row with `key`. Fails when the key
    /// arity does not match the key fields.
    fn key_filter<T: Entity>(&self, key: &Key) -> Result<Filter, DataError> {
        key.filter_named::<T>(self.primary_key_fields::<T>()?)
    }

    fn find_by_key<T: Entity>(
        &self,
        key: &Key,
        tracking: Tracking,
    ) -> impl Future<Output = Result<Option<T>, DataError>> + Send;

    /// Run a query, including the relations it names.
    fn fetch<T: Entity>(
        &self,
        query: &Query<T>,
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn count<T: Entity>(
        &self,
        predicate: Option<&Predicate<T>>,
    ) -> impl Future<Output = Result<u64, DataError>> + Send;

    fn any<T: Entity>(
        &self,
        predicate: Option<&Predicate<T>>,
    ) -> impl Future<Output = Result<bool, DataError>> + Send {
        async move { Ok(self.count(predicate).await? > 0) }
    }

    /// `None` when no record matches. Fails with `Overflow` when the result
    /// does not fit `V`.
    fn aggregate<T: Entity, V: Numeric>(
        &self,
        op: Aggregate,
        selector: &Selector<T, V>,
        predicate: Option<&Predicate<T>>,
    ) -> impl Future<Output = Result<Option<V>, DataError>> + Send {
        async move {
            let rows = self.fetch(&matching(predicate)).await?;
            op.fold(T::entity_name(), rows.iter().map(|r| selector.select(r)))
        }
    }

    /// `None` when no record matches.
    fn average<T: Entity, V: Numeric>(
        &self,
        selector: &Selector<T, V>,
        predicate: Option<&Predicate<T>>,
    ) -> impl Future<Output = Result<Option<f64>, DataError>> + Send {
        async move {
            let rows = self.fetch(&matching(predicate)).await?;
            Ok(mean(rows.iter().map(|r| selector.select(r))))
        }
    }

    fn add<T: Entity>(&self, record: &T) -> Result<(), DataError>;

    fn add_range<T: Entity>(&self, records: &[T]) -> Result<(), DataError> {
        records.iter().try_for_each(|r| self.add(r))
    }

    /// Stage a full-row update of the record with the same key.
    fn update<T: Entity>(&self, record: &T) -> Result<(), DataError>;

    fn remove<T: Entity>(&self, record: &T) -> Result<(), DataError>;

    fn remove_range<T: Entity>(&self, records: &[T]) -> Result<(), DataError> {
        records.iter().try_for_each(|r| self.remove(r))
    }

    /// Overwrite every field of a loaded record with `incoming` and stage the
    /// change.
    fn copy_values<T: Entity>(&self, existing: &mut T, incoming: &T) -> Result<(), DataError> {
        existing.clone_from(incoming);
        self.update(existing)
    }

    /// Drop staged writes that were never saved.
    fn clear_pending(&self);

    /// Flush staged writes. Returns the number of affected rows.
    fn save(&self) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Fails with `TransactionFailed` if a transaction is already active.
    fn begin_transaction(&self) -> impl Future<Output = Result<(), DataError>> + Send;

    fn commit(&self) -> impl Future<Output = Result<(), DataError>> + Send;

    fn rollback(&self) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Roll back without awaiting. Used when a transaction scope is dropped
    /// before it was released.
    fn discard_transaction(&self);

    fn in_transaction(&self) -> bool;

    fn execute_raw_query<T: Entity>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn execute_raw_command(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<u64, DataError>> + Send;
}

fn matching<T>(predicate: Option<&Predicate<T>>) -> Query<T> {
    match predicate {
        Some(p) => Query::filtered(p.clone()),
        None => Query::all(),
    }
}
