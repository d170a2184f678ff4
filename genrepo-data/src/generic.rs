use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use genrepo_core::ManagedResource;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::RepositoryConfig;
use crate::context::StorageContext;
use crate::criteria::Query;
use crate::entity::{Entity, Key};
use crate::error::{BoxError, DataError};
use crate::page::{Page, Pageable};
use crate::predicate::{Aggregate, Include, Numeric, OrderBy, Predicate, Selector, Tracking};
use crate::repository::Repository;
use crate::transaction::TransactionScope;

/// The one [`Repository`] implementation, generic over the record type and
/// the storage context.
///
/// Holds no state between calls besides the context handle, an optional
/// cancellation token and its defaults. Cloning is cheap and clones share
/// the context.
///
/// # Example
///
/// ```ignore
/// let ctx = InMemoryContext::new();
/// let users = GenericRepository::<User, _>::new(ctx.clone());
/// users.add(User { id: 1, name: "alice".into() }).await?;
/// let alice = users.get_by_id(1).await?;
/// ```
pub struct GenericRepository<T, C> {
    ctx: C,
    cancellation: Option<CancellationToken>,
    config: RepositoryConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C: Clone> Clone for GenericRepository<T, C> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            cancellation: self.cancellation.clone(),
            config: self.config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, C> GenericRepository<T, C>
where
    T: Entity,
    C: StorageContext + Clone,
{
    pub fn new(ctx: C) -> Self {
        Self {
            ctx,
            cancellation: None,
            config: RepositoryConfig::default(),
            _marker: PhantomData,
        }
    }

    /// Abort pending storage calls with `Cancelled` once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn check_cancelled(&self) -> Result<(), DataError> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(DataError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Race a storage call against the cancellation token.
    async fn guard<R>(
        &self,
        call: impl Future<Output = Result<R, DataError>>,
    ) -> Result<R, DataError> {
        match &self.cancellation {
            None => call.await,
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(DataError::Cancelled),
                result = call => result,
            },
        }
    }

    /// Stage writes. A failure drops whatever this call staged.
    fn stage(&self, write: impl FnOnce(&C) -> Result<(), DataError>) -> Result<(), DataError> {
        write(&self.ctx).inspect_err(|_| self.ctx.clear_pending())
    }

    async fn autosave(&self, operation: &'static str) -> Result<u64, DataError> {
        let rows = self
            .guard(self.ctx.save())
            .await
            .inspect_err(|_| self.ctx.clear_pending())?;
        tracing::debug!(entity = T::entity_name(), operation, rows, "autosave");
        Ok(rows)
    }

    fn id_key(&self, id: i64) -> Result<Key, DataError> {
        if id <= 0 {
            return Err(DataError::InvalidArgument(format!(
                "id of {} must be greater than 0, got {id}",
                T::entity_name()
            )));
        }
        let fields = self.ctx.primary_key_fields::<T>()?;
        if fields.len() != 1 {
            return Err(DataError::InvalidArgument(format!(
                "{} has a composite key ({}); look it up with get_by_key",
                T::entity_name(),
                fields.join(", ")
            )));
        }
        Ok(Key::from(id))
    }

    fn require(record: Option<T>) -> Result<T, DataError> {
        record.ok_or(DataError::NullEntity {
            entity: T::entity_name(),
        })
    }

    fn require_all(records: Vec<Option<T>>) -> Result<Vec<T>, DataError> {
        records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                record.ok_or(DataError::NullEntityInCollection {
                    entity: T::entity_name(),
                    index,
                })
            })
            .collect()
    }

    fn require_non_empty(records: &[Option<T>], operation: &str) -> Result<(), DataError> {
        if records.is_empty() {
            return Err(DataError::InvalidArgument(format!(
                "{operation} of {} requires at least one record",
                T::entity_name()
            )));
        }
        Ok(())
    }

    /// Load the tracked record with `key`, or fail with `EntityNotFound`.
    async fn load_existing(&self, key: &Key) -> Result<T, DataError> {
        self.guard(self.ctx.find_by_key::<T>(key, Tracking::Tracking))
            .await?
            .ok_or_else(|| DataError::EntityNotFound {
                entity: T::entity_name(),
                key: key.to_string(),
            })
    }

    /// Resolve the key of `record` through the context's metadata.
    fn key_of(&self, record: &T) -> Result<Key, DataError> {
        self.ctx.key_of(record)
    }

    async fn fetch(&self, query: Query<T>) -> Result<Vec<T>, DataError> {
        self.check_cancelled()?;
        let rows = self.guard(self.ctx.fetch(&query)).await?;
        tracing::debug!(entity = T::entity_name(), rows = rows.len(), "fetched");
        Ok(rows)
    }

    async fn first(&self, query: Query<T>) -> Result<Option<T>, DataError> {
        Ok(self.fetch(query.take(1)).await?.into_iter().next())
    }

    async fn aggregate_of<V: Numeric>(
        &self,
        op: Aggregate,
        selector: Selector<T, V>,
        predicate: Option<Predicate<T>>,
    ) -> Result<V, DataError> {
        self.check_cancelled()?;
        self.guard(self.ctx.aggregate(op, &selector, predicate.as_ref()))
            .await?
            .ok_or(DataError::EmptySequence {
                entity: T::entity_name(),
                operation: op.name(),
            })
    }

    async fn average_of<V: Numeric>(
        &self,
        selector: Selector<T, V>,
        predicate: Option<Predicate<T>>,
    ) -> Result<f64, DataError> {
        self.check_cancelled()?;
        self.guard(self.ctx.average(&selector, predicate.as_ref()))
            .await?
            .ok_or(DataError::EmptySequence {
                entity: T::entity_name(),
                operation: "average",
            })
    }

    fn page_query(
        &self,
        pageable: &Pageable,
        order: Option<OrderBy<T>>,
        tracking: Tracking,
    ) -> Result<Query<T>, DataError> {
        let offset = pageable.offset()?;
        if let Some(max) = self.config.max_page_size {
            if pageable.size as u64 > max {
                return Err(DataError::InvalidArgument(format!(
                    "page size {} exceeds the maximum of {max}",
                    pageable.size
                )));
            }
        }
        let query = Query::all()
            .skip(offset)
            .take(pageable.size as u64)
            .tracking(tracking);
        Ok(match order {
            Some(order) => query.order_by(order),
            None => query,
        })
    }

    fn raw_sql(sql: &str) -> Result<&str, DataError> {
        if sql.trim().is_empty() {
            return Err(DataError::EmptyQuery);
        }
        Ok(sql)
    }
}

impl<T, C> Repository<T> for GenericRepository<T, C>
where
    T: Entity,
    C: StorageContext + Clone,
{
    async fn get_by_id(&self, id: i64) -> Result<Option<T>, DataError> {
        self.check_cancelled()?;
        let key = self.id_key(id)?;
        self.guard(self.ctx.find_by_key(&key, self.config.tracking)).await
    }

    async fn get_by_key(&self, key: Key) -> Result<Option<T>, DataError> {
        self.check_cancelled()?;
        self.ctx.key_filter::<T>(&key)?;
        self.guard(self.ctx.find_by_key(&key, self.config.tracking)).await
    }

    async fn get_all(&self, tracking: Tracking) -> Result<Vec<T>, DataError> {
        self.fetch(Query::all().tracking(tracking)).await
    }

    async fn get_first(&self, predicate: Predicate<T>) -> Result<Option<T>, DataError> {
        self.first(Query::filtered(predicate).tracking(self.config.tracking))
            .await
    }

    async fn get_where(&self, predicate: Predicate<T>) -> Result<Vec<T>, DataError> {
        self.fetch(Query::filtered(predicate).tracking(self.config.tracking))
            .await
    }

    async fn get_first_with_related(
        &self,
        predicate: Predicate<T>,
        include: Include<T>,
    ) -> Result<Option<T>, DataError> {
        self.first(
            Query::filtered(predicate)
                .include(include)
                .tracking(self.config.tracking),
        )
        .await
    }

    async fn get_with_related(
        &self,
        predicate: Predicate<T>,
        include: Include<T>,
    ) -> Result<Vec<T>, DataError> {
        self.fetch(
            Query::filtered(predicate)
                .include(include)
                .tracking(self.config.tracking),
        )
        .await
    }

    async fn exists(&self, predicate: Predicate<T>) -> Result<bool, DataError> {
        self.check_cancelled()?;
        self.guard(self.ctx.any(Some(&predicate))).await
    }

    async fn is_empty(&self) -> Result<bool, DataError> {
        self.check_cancelled()?;
        Ok(!self.guard(self.ctx.any::<T>(None)).await?)
    }

    async fn count(&self) -> Result<u64, DataError> {
        self.check_cancelled()?;
        self.guard(self.ctx.count::<T>(None)).await
    }

    async fn count_where(&self, predicate: Predicate<T>) -> Result<u64, DataError> {
        self.check_cancelled()?;
        self.guard(self.ctx.count(Some(&predicate))).await
    }

    async fn max<V: Numeric>(&self, selector: Selector<T, V>) -> Result<V, DataError> {
        self.aggregate_of(Aggregate::Max, selector, None).await
    }

    async fn max_where<V: Numeric>(
        &self,
        selector: Selector<T, V>,
        predicate: Predicate<T>,
    ) -> Result<V, DataError> {
        self.aggregate_of(Aggregate::Max, selector, Some(predicate))
            .await
    }

    async fn min<V: Numeric>(&self, selector: Selector<T, V>) -> Result<V, DataError> {
        self.aggregate_of(Aggregate::Min, selector, None).await
    }

    async fn min_where<V: Numeric>(
        &self,
        selector: Selector<T, V>,
        predicate: Predicate<T>,
    ) -> Result<V, DataError> {
        self.aggregate_of(Aggregate::Min, selector, Some(predicate))
            .await
    }

    async fn sum<V: Numeric>(&self, selector: Selector<T, V>) -> Result<V, DataError> {
        self.aggregate_of(Aggregate::Sum, selector, None).await
    }

    async fn sum_where<V: Numeric>(
        &self,
        selector: Selector<T, V>,
        predicate: Predicate<T>,
    ) -> Result<V, DataError> {
        self.aggregate_of(Aggregate::Sum, selector, Some(predicate))
            .await
    }

    async fn average<V: Numeric>(&self, selector: Selector<T, V>) -> Result<f64, DataError> {
        self.average_of(selector, None).await
    }

    async fn average_where<V: Numeric>(
        &self,
        selector: Selector<T, V>,
        predicate: Predicate<T>,
    ) -> Result<f64, DataError> {
        self.average_of(selector, Some(predicate)).await
    }

    async fn get_ordered(&self, order: OrderBy<T>, tracking: Tracking) -> Result<Vec<T>, DataError> {
        self.fetch(Query::all().order_by(order).tracking(tracking))
            .await
    }

    async fn get_paged(
        &self,
        page: i64,
        size: i64,
        order: Option<OrderBy<T>>,
        tracking: Tracking,
    ) -> Result<Vec<T>, DataError> {
        self.check_cancelled()?;
        let query = self.page_query(&Pageable::new(page, size), order, tracking)?;
        self.fetch(query).await
    }

    async fn get_page(
        &self,
        pageable: &Pageable,
        order: Option<OrderBy<T>>,
    ) -> Result<Page<T>, DataError> {
        self.check_cancelled()?;
        let query = self.page_query(pageable, order, self.config.tracking)?;
        let total = self.guard(self.ctx.count::<T>(None)).await?;
        let content = self.fetch(query).await?;
        Ok(Page::new(content, pageable, total))
    }

    fn add(&self, record: impl Into<Option<T>>) -> impl Future<Output = Result<u64, DataError>> + Send {
        let record = record.into();
        async move {
            self.check_cancelled()?;
            let record = Self::require(record)?;
            self.stage(|ctx| ctx.add(&record))?;
            self.autosave("add").await
        }
    }

    fn add_range<I>(&self, records: I) -> impl Future<Output = Result<u64, DataError>> + Send
    where
        I: IntoIterator,
        I::Item: Into<Option<T>>,
    {
        let records: Vec<Option<T>> = records.into_iter().map(Into::into).collect();
        async move {
            self.check_cancelled()?;
            let records = Self::require_all(records)?;
            self.stage(|ctx| ctx.add_range(&records))?;
            self.autosave("add_range").await
        }
    }

    fn update(&self, record: impl Into<Option<T>>) -> impl Future<Output = Result<u64, DataError>> + Send {
        let record = record.into();
        async move {
            self.check_cancelled()?;
            let record = Self::require(record)?;
            let key = self.key_of(&record)?;
            let mut existing = self.load_existing(&key).await?;
            self.stage(|ctx| ctx.copy_values(&mut existing, &record))?;
            self.autosave("update").await
        }
    }

    async fn update_by_id<F>(&self, id: i64, action: F) -> Result<u64, DataError>
    where
        F: FnOnce(&mut T) + Send,
    {
        self.check_cancelled()?;
        let key = self.id_key(id)?;
        let mut existing = self.load_existing(&key).await?;
        action(&mut existing);
        self.stage(|ctx| ctx.update(&existing))?;
        self.autosave("update_by_id").await
    }

    fn update_range<I>(&self, records: I) -> impl Future<Output = Result<u64, DataError>> + Send
    where
        I: IntoIterator,
        I::Item: Into<Option<T>>,
    {
        let records: Vec<Option<T>> = records.into_iter().map(Into::into).collect();
        async move {
            self.check_cancelled()?;
            Self::require_non_empty(&records, "update_range")?;
            let records = Self::require_all(records)?;
            let mut pairs = Vec::with_capacity(records.len());
            for record in records {
                let key = self.key_of(&record)?;
                let existing = self.load_existing(&key).await?;
                pairs.push((existing, record));
            }
            self.stage(|ctx| {
                pairs
                    .iter_mut()
                    .try_for_each(|(existing, record)| ctx.copy_values(existing, record))
            })?;
            self.autosave("update_range").await
        }
    }

    async fn update_where<F>(&self, predicate: Predicate<T>, mut action: F) -> Result<u64, DataError>
    where
        F: FnMut(&mut T) + Send,
    {
        let mut matched = self
            .fetch(Query::filtered(predicate).tracking(Tracking::Tracking))
            .await?;
        for record in &mut matched {
            action(record);
        }
        self.stage(|ctx| matched.iter().try_for_each(|r| ctx.update(r)))?;
        self.autosave("update_where").await
    }

    fn remove(&self, record: impl Into<Option<T>>) -> impl Future<Output = Result<u64, DataError>> + Send {
        let record = record.into();
        async move {
            self.check_cancelled()?;
            let record = Self::require(record)?;
            let key = self.key_of(&record)?;
            let existing = self.load_existing(&key).await?;
            self.stage(|ctx| ctx.remove(&existing))?;
            self.autosave("remove").await
        }
    }

    async fn remove_by_id(&self, id: i64) -> Result<u64, DataError> {
        self.check_cancelled()?;
        let key = self.id_key(id)?;
        let existing = self.load_existing(&key).await?;
        self.stage(|ctx| ctx.remove(&existing))?;
        self.autosave("remove_by_id").await
    }

    fn remove_range<I>(&self, records: I) -> impl Future<Output = Result<u64, DataError>> + Send
    where
        I: IntoIterator,
        I::Item: Into<Option<T>>,
    {
        let records: Vec<Option<T>> = records.into_iter().map(Into::into).collect();
        async move {
            self.check_cancelled()?;
            Self::require_non_empty(&records, "remove_range")?;
            let records = Self::require_all(records)?;
            let mut existing = Vec::with_capacity(records.len());
            for record in &records {
                let key = self.key_of(record)?;
                existing.push(self.load_existing(&key).await?);
            }
            self.stage(|ctx| ctx.remove_range(&existing))?;
            self.autosave("remove_range").await
        }
    }

    async fn remove_where(&self, predicate: Predicate<T>) -> Result<u64, DataError> {
        let matched = self
            .fetch(Query::filtered(predicate).tracking(Tracking::Tracking))
            .await?;
        self.stage(|ctx| ctx.remove_range(&matched))?;
        self.autosave("remove_where").await
    }

    async fn execute_transaction<F, Fut, E>(&self, action: F) -> Result<(), DataError>
    where
        F: FnOnce(Self) -> Fut + Send,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Into<BoxError> + Send,
    {
        self.check_cancelled()?;
        let scope = self
            .guard(TransactionScope::<C>::acquire(&self.ctx))
            .await
            .map_err(DataError::transaction_failed)?;

        let this = self;
        let work = async move {
            this.guard(async move {
                action(this.clone())
                    .await
                    .map_err(|err| DataError::from_boxed(err.into()))
            })
            .await?;
            this.autosave("execute_transaction").await
        };
        let outcome = AssertUnwindSafe(work)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(DataError::TransactionFailed {
                    message: panic_message(panic.as_ref()),
                    source: None,
                })
            });

        match outcome {
            Ok(rows) => {
                scope.release(true).await.map_err(DataError::transaction_failed)?;
                tracing::debug!(entity = T::entity_name(), rows, "transaction completed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(entity = T::entity_name(), error = %err, "transaction failed, rolling back");
                if let Err(rollback) = scope.release(false).await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(DataError::transaction_failed(err))
            }
        }
    }

    async fn execute_sql_raw(&self, sql: &str, params: &[Value]) -> Result<Vec<T>, DataError> {
        self.check_cancelled()?;
        let sql = Self::raw_sql(sql)?;
        self.guard(self.ctx.execute_raw_query::<T>(sql, params)).await
    }

    async fn execute_sql_raw_command(&self, sql: &str, params: &[Value]) -> Result<u64, DataError> {
        self.check_cancelled()?;
        let sql = Self::raw_sql(sql)?;
        self.guard(self.ctx.execute_raw_command(sql, params)).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("action panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("action panicked: {msg}")
    } else {
        "action panicked".to_string()
    }
}
