//! [`StorageContext`] over an SQLite pool.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use genrepo_core::GenrepoConfig;
use genrepo_data::{
    record_fields, Aggregate, ColumnKind, DataError, DataSourceConfig, Dialect, Entity, IdentifierPolicy, Key,
    Numeric, Predicate, Query, QueryBuilder, RelationLoader, RelationRegistry, Selector,
    StorageContext, Tracking,
};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tokio::sync::Mutex as AsyncMutex;

use crate::codec::{bind_all, column_names, decode_row, params, Param};
use crate::error::SqlxErrorExt;

/// Run `$body` against the active transaction if there is one, otherwise
/// against the pool.
macro_rules! with_executor {
    ($ctx:expr, |$exec:ident| $body:expr) => {{
        let mut guard = $ctx.inner.tx.lock().await;
        match guard.as_mut() {
            Some(tx) => {
                let $exec = &mut **tx;
                $body
            }
            None => {
                let $exec = &$ctx.inner.pool;
                $body
            }
        }
    }};
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Write {
    Insert,
    Update,
    Delete,
}

#[derive(Debug)]
struct Pending {
    write: Write,
    entity: &'static str,
    key: String,
    sql: String,
    params: Vec<Param>,
}

struct Session {
    pool: SqlitePool,
    tx: AsyncMutex<Option<Transaction<'static, Sqlite>>>,
    active: AtomicBool,
    /// Bumped on every begin. A deferred discard only drops the transaction
    /// it was issued for.
    generation: AtomicU64,
    pending: Mutex<Vec<Pending>>,
    saves: AtomicU64,
    relations: RelationRegistry<SqliteContext>,
}

/// SQLite-backed storage context.
///
/// Writes are staged as SQL statements and flushed on
/// [`save`](StorageContext::save) inside one database transaction, or inside
/// a savepoint of the active transaction. Predicates built from filters and
/// orderings over named columns are pushed down to SQL; the rest of a query
/// is evaluated in process.
///
/// ```ignore
/// let ctx = SqliteContext::connect(&DataSourceConfig::new("sqlite://app.db")).await?;
/// let users = GenericRepository::<User, _>::new(ctx);
/// ```
#[derive(Clone)]
pub struct SqliteContext {
    inner: Arc<Session>,
}

impl SqliteContext {
    /// Open a pool for `config.url`. Database files are created if missing.
    ///
    /// In-memory databases live as long as their connection, so they get a
    /// single connection that is never recycled.
    pub async fn connect(config: &DataSourceConfig) -> Result<Self, DataError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(SqlxErrorExt::into_data_error)?
            .create_if_missing(true);
        let in_memory = config.url.contains(":memory:") || config.url.contains("mode=memory");

        let max_connections = if in_memory { 1 } else { config.max_connections };
        let mut pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(config.acquire_timeout);
        if in_memory {
            pool = pool.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool
            .connect_with(options)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;

        tracing::info!(url = %config.url, max_connections, "sqlite pool ready");
        Ok(Self::from_pool(pool))
    }

    /// Connect using the `genrepo.datasource` section of `config`.
    pub async fn from_config(config: &GenrepoConfig) -> Result<Self, DataError> {
        let datasource: DataSourceConfig = config
            .section()
            .map_err(|e| DataError::Other(e.to_string()))?;
        Self::connect(&datasource).await
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(Session {
                pool,
                tx: AsyncMutex::new(None),
                active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                pending: Mutex::new(Vec::new()),
                saves: AtomicU64::new(0),
                relations: RelationRegistry::new(),
            }),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Register a relation for eager loading.
    pub fn register_relation<P: Entity>(
        &self,
        loader: impl RelationLoader<P, SqliteContext> + 'static,
    ) -> Result<(), DataError> {
        self.inner.relations.register(loader)
    }

    /// Number of completed `save` calls that flushed at least one write.
    pub fn save_count(&self) -> u64 {
        self.inner.saves.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn builder<T: Entity>() -> QueryBuilder {
        QueryBuilder::new_with_dialect(T::table_name(), Dialect::Sqlite)
            .identifier_policy(IdentifierPolicy::Quote)
    }

    fn pending(&self) -> Result<MutexGuard<'_, Vec<Pending>>, DataError> {
        self.inner
            .pending
            .lock()
            .map_err(|_| DataError::Other("sqlite pending writes lock poisoned".into()))
    }

    async fn fetch_rows(&self, sql: &str, params: Vec<Param>) -> Result<Vec<SqliteRow>, DataError> {
        tracing::trace!(sql, "fetch");
        with_executor!(self, |exec| bind_all(sql, params).fetch_all(exec).await)
            .map_err(SqlxErrorExt::into_data_error)
    }

    async fn fetch_optional_row(&self, sql: &str, params: Vec<Param>) -> Result<Option<SqliteRow>, DataError> {
        tracing::trace!(sql, "fetch optional");
        with_executor!(self, |exec| bind_all(sql, params).fetch_optional(exec).await)
            .map_err(SqlxErrorExt::into_data_error)
    }

    async fn fetch_one_row(&self, sql: &str, params: Vec<Param>) -> Result<SqliteRow, DataError> {
        tracing::trace!(sql, "fetch one");
        with_executor!(self, |exec| bind_all(sql, params).fetch_one(exec).await)
            .map_err(SqlxErrorExt::into_data_error)
    }

    async fn execute(&self, sql: &str, params: Vec<Param>) -> Result<u64, DataError> {
        tracing::trace!(sql, "execute");
        with_executor!(self, |exec| bind_all(sql, params).execute(exec).await)
            .map(|done| done.rows_affected())
            .map_err(SqlxErrorExt::into_data_error)
    }

    /// Aggregate statement over `column`. `None` when the selector or
    /// predicate cannot be pushed down.
    fn aggregate_statement<T: Entity>(
        function: &str,
        column: Option<&'static str>,
        predicate: Option<&Predicate<T>>,
    ) -> Result<Option<(String, Vec<Value>)>, DataError> {
        let Some(column) = column else {
            return Ok(None);
        };
        let mut builder = Self::builder::<T>();
        if let Some(predicate) = predicate {
            match predicate.to_filter() {
                Some(filter) => builder = builder.filter(filter),
                None => return Ok(None),
            }
        }
        Ok(Some(builder.build_aggregate(function, column)?))
    }

    /// `MAX`, `MIN` or `SUM` in SQL, decoded by the column's storage class.
    /// `None` when the aggregate cannot be pushed down.
    async fn sql_aggregate<T: Entity, V: Numeric>(
        &self,
        op: Aggregate,
        column: Option<&'static str>,
        predicate: Option<&Predicate<T>>,
    ) -> Result<Option<Option<V>>, DataError> {
        let Some(kind) = column.and_then(T::column).map(|c| c.kind) else {
            return Ok(None);
        };
        if !matches!(kind, ColumnKind::Integer | ColumnKind::Boolean | ColumnKind::Real) {
            return Ok(None);
        }
        let Some((sql, values)) = Self::aggregate_statement(op.sql_function(), column, predicate)? else {
            return Ok(None);
        };
        let entity = T::entity_name();
        let row = self
            .fetch_one_row(&sql, params(&values))
            .await
            .map_err(|err| match err {
                // SQLite rejects an integer SUM past i64.
                DataError::Database(e) if e.to_string().contains("integer overflow") => op.overflow(entity),
                other => other,
            })?;
        let value = if kind == ColumnKind::Real {
            let raw: Option<f64> = row.try_get_unchecked(0).map_err(SqlxErrorExt::into_data_error)?;
            raw.map(|v| V::from_real(v).ok_or_else(|| op.overflow(entity)))
        } else {
            let raw: Option<i64> = row.try_get_unchecked(0).map_err(SqlxErrorExt::into_data_error)?;
            raw.map(|v| V::from_i64(v).ok_or_else(|| op.overflow(entity)))
        };
        Ok(Some(value.transpose()?))
    }

    async fn fetch_matching<T: Entity>(&self, predicate: Option<&Predicate<T>>) -> Result<Vec<T>, DataError> {
        let query = match predicate {
            Some(p) => Query::filtered(p.clone()),
            None => Query::all(),
        };
        self.fetch(&query).await
    }

    fn stage<T: Entity>(&self, write: Write, record: &T) -> Result<(), DataError> {
        let fields = record_fields(record)?;
        let keys = self.primary_key_fields::<T>()?;
        let key = Key::from_fields_named::<T>(keys, &fields)?;
        let builder = Self::builder::<T>();

        let (sql, params) = match write {
            Write::Insert => {
                let sql = builder.build_insert(&column_names::<T>())?;
                let params = T::columns()
                    .iter()
                    .map(|c| Param::for_column(c.kind, fields.get(c.name)))
                    .collect();
                (sql, params)
            }
            Write::Update => {
                let mut set: Vec<_> = T::columns()
                    .iter()
                    .filter(|c| !keys.contains(&c.name))
                    .collect();
                if set.is_empty() {
                    set = T::columns().iter().collect();
                }
                let names: Vec<&str> = set.iter().map(|c| c.name).collect();
                let sql = builder.build_update(&names, keys)?;
                let params = set
                    .iter()
                    .map(|c| Param::for_column(c.kind, fields.get(c.name)))
                    .chain(key.values().iter().map(Param::from_value))
                    .collect();
                (sql, params)
            }
            Write::Delete => {
                let (sql, values) = builder.filter(key.filter_named::<T>(keys)?).build_delete()?;
                (sql, params(&values))
            }
        };

        self.pending()?.push(Pending {
            write,
            entity: T::entity_name(),
            key: key.to_string(),
            sql,
            params,
        });
        Ok(())
    }

    async fn apply(conn: &mut SqliteConnection, writes: Vec<Pending>) -> Result<u64, DataError> {
        let mut affected = 0u64;
        for write in writes {
            tracing::trace!(sql = %write.sql, "flush");
            let rows = bind_all(&write.sql, write.params)
                .execute(&mut *conn)
                .await
                .map_err(SqlxErrorExt::into_data_error)?
                .rows_affected();
            if rows == 0 && write.write != Write::Insert {
                return Err(DataError::EntityNotFound {
                    entity: write.entity,
                    key: write.key,
                });
            }
            affected += rows;
        }
        Ok(affected)
    }
}

impl StorageContext for SqliteContext {
    async fn find_by_key<T: Entity>(&self, key: &Key, _tracking: Tracking) -> Result<Option<T>, DataError> {
        let (sql, values) = Self::builder::<T>()
            .filter(self.key_filter::<T>(key)?)
            .build_select(&column_names::<T>())?;
        let row = self.fetch_optional_row(&sql, params(&values)).await?;
        let found = row.as_ref().map(decode_row::<T>).transpose()?;
        tracing::debug!(entity = T::entity_name(), key = %key, found = found.is_some(), "find_by_key");
        Ok(found)
    }

    async fn fetch<T: Entity>(&self, query: &Query<T>) -> Result<Vec<T>, DataError> {
        let mut builder = Self::builder::<T>();
        let filter_pushed = match query.predicate() {
            None => true,
            Some(predicate) => match predicate.to_filter() {
                Some(filter) => {
                    builder = builder.filter(filter);
                    true
                }
                None => false,
            },
        };
        let orders: Option<Vec<(&'static str, bool)>> = query
            .orders()
            .iter()
            .map(|o| o.column().map(|c| (c, o.is_ascending())))
            .collect();
        let fully_pushed = match (filter_pushed, orders) {
            (true, Some(orders)) => {
                for (column, ascending) in orders {
                    builder = builder.order_by(column, ascending);
                }
                if let Some(take) = query.take_count() {
                    builder = builder.limit(take);
                }
                if let Some(skip) = query.skip_count() {
                    builder = builder.offset(skip);
                }
                true
            }
            _ => false,
        };

        let (sql, values) = builder.build_select(&column_names::<T>())?;
        let rows = self.fetch_rows(&sql, params(&values)).await?;
        let mut records = rows.iter().map(decode_row::<T>).collect::<Result<Vec<T>, _>>()?;
        if !fully_pushed {
            records = if filter_pushed {
                query.sort(&mut records);
                query.window(records)
            } else {
                query.apply(records)?
            };
        }

        self.inner
            .relations
            .load_includes(self, query.includes(), &mut records)
            .await?;
        tracing::debug!(
            entity = T::entity_name(),
            rows = records.len(),
            pushed_down = fully_pushed,
            "fetch"
        );
        Ok(records)
    }

    async fn count<T: Entity>(&self, predicate: Option<&Predicate<T>>) -> Result<u64, DataError> {
        let filter = match predicate {
            None => None,
            Some(p) => match p.to_filter() {
                Some(filter) => Some(filter),
                None => return Ok(self.fetch_matching(Some(p)).await?.len() as u64),
            },
        };
        let builder = match filter {
            Some(filter) => Self::builder::<T>().filter(filter),
            None => Self::builder::<T>(),
        };
        let (sql, values) = builder.build_count()?;
        let row = self.fetch_one_row(&sql, params(&values)).await?;
        let count: i64 = row.try_get(0).map_err(SqlxErrorExt::into_data_error)?;
        Ok(count.max(0) as u64)
    }

    async fn aggregate<T: Entity, V: Numeric>(
        &self,
        op: Aggregate,
        selector: &Selector<T, V>,
        predicate: Option<&Predicate<T>>,
    ) -> Result<Option<V>, DataError> {
        if let Some(value) = self
            .sql_aggregate::<T, V>(op, selector.column_name(), predicate)
            .await?
        {
            return Ok(value);
        }
        let rows = self.fetch_matching(predicate).await?;
        op.fold(T::entity_name(), rows.iter().map(|r| selector.select(r)))
    }

    async fn average<T: Entity, V: Numeric>(
        &self,
        selector: &Selector<T, V>,
        predicate: Option<&Predicate<T>>,
    ) -> Result<Option<f64>, DataError> {
        if let Some((sql, values)) = Self::aggregate_statement("AVG", selector.column_name(), predicate)? {
            let row = self.fetch_one_row(&sql, params(&values)).await?;
            let value: Option<f64> = row.try_get_unchecked(0).map_err(SqlxErrorExt::into_data_error)?;
            return Ok(value);
        }
        let rows = self.fetch_matching(predicate).await?;
        Ok(genrepo_data::predicate::mean(rows.iter().map(|r| selector.select(r))))
    }

    fn add<T: Entity>(&self, record: &T) -> Result<(), DataError> {
        self.stage(Write::Insert, record)
    }

    fn update<T: Entity>(&self, record: &T) -> Result<(), DataError> {
        self.stage(Write::Update, record)
    }

    fn remove<T: Entity>(&self, record: &T) -> Result<(), DataError> {
        self.stage(Write::Delete, record)
    }

    fn clear_pending(&self) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.clear();
        }
    }

    async fn save(&self) -> Result<u64, DataError> {
        let writes = std::mem::take(&mut *self.pending()?);
        if writes.is_empty() {
            return Ok(0);
        }
        let mut guard = self.inner.tx.lock().await;
        let affected = match guard.as_mut() {
            Some(tx) => {
                let mut savepoint = sqlx::Connection::begin(&mut **tx)
                    .await
                    .map_err(SqlxErrorExt::into_data_error)?;
                let affected = Self::apply(&mut savepoint, writes).await?;
                savepoint.commit().await.map_err(SqlxErrorExt::into_data_error)?;
                affected
            }
            None => {
                let mut tx = self
                    .inner
                    .pool
                    .begin()
                    .await
                    .map_err(SqlxErrorExt::into_data_error)?;
                let affected = Self::apply(&mut tx, writes).await?;
                tx.commit().await.map_err(SqlxErrorExt::into_data_error)?;
                affected
            }
        };
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(affected, "sqlite save");
        Ok(affected)
    }

    async fn begin_transaction(&self) -> Result<(), DataError> {
        let mut guard = self.inner.tx.lock().await;
        if guard.is_some() {
            if self.inner.active.load(Ordering::SeqCst) {
                return Err(DataError::TransactionFailed {
                    message: "a transaction is already active on this context; nested transactions are not supported".to_string(),
                    source: None,
                });
            }
            // Discarded while busy; its deferred cleanup has not run yet.
            tracing::debug!("dropping discarded sqlite transaction before begin");
            drop(guard.take());
        }
        let tx = self
            .inner
            .pool
            .begin()
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        *guard = Some(tx);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<(), DataError> {
        let tx = self.inner.tx.lock().await.take();
        self.inner.active.store(false, Ordering::SeqCst);
        match tx {
            Some(tx) => tx.commit().await.map_err(SqlxErrorExt::into_data_error),
            None => Err(no_transaction()),
        }
    }

    async fn rollback(&self) -> Result<(), DataError> {
        let tx = self.inner.tx.lock().await.take();
        self.inner.active.store(false, Ordering::SeqCst);
        self.clear_pending();
        match tx {
            Some(tx) => tx.rollback().await.map_err(SqlxErrorExt::into_data_error),
            None => Err(no_transaction()),
        }
    }

    /// Drops the transaction in place when its lock is free. Otherwise the
    /// drop is deferred to a spawned task, which skips a transaction begun
    /// after this call.
    fn discard_transaction(&self) {
        self.clear_pending();
        self.inner.active.store(false, Ordering::SeqCst);
        // Dropping a sqlx transaction queues its rollback on the connection.
        match self.inner.tx.try_lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    tracing::warn!("sqlite transaction busy, discarding it in the background");
                    let inner = Arc::clone(&self.inner);
                    let generation = inner.generation.load(Ordering::SeqCst);
                    handle.spawn(async move {
                        let mut guard = inner.tx.lock().await;
                        if inner.generation.load(Ordering::SeqCst) == generation {
                            drop(guard.take());
                        }
                    });
                }
                Err(_) => tracing::warn!("sqlite transaction busy and no runtime to discard it on"),
            },
        }
    }

    fn in_transaction(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    async fn execute_raw_query<T: Entity>(&self, sql: &str, values: &[Value]) -> Result<Vec<T>, DataError> {
        let rows = self.fetch_rows(sql, params(values)).await?;
        let records = rows.iter().map(decode_row::<T>).collect::<Result<Vec<T>, _>>()?;
        tracing::debug!(entity = T::entity_name(), rows = records.len(), "raw query");
        Ok(records)
    }

    async fn execute_raw_command(&self, sql: &str, values: &[Value]) -> Result<u64, DataError> {
        let affected = self.execute(sql, params(values)).await?;
        tracing::debug!(affected, "raw command");
        Ok(affected)
    }
}

fn no_transaction() -> DataError {
    DataError::TransactionFailed {
        message: "no active transaction".to_string(),
        source: None,
    }
}
