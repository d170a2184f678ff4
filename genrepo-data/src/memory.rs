//! In-process [`StorageContext`].
//!
//! Rows are kept serialized, one insertion-ordered table per entity. Writes
//! are staged and applied all-or-nothing on `save`. Transactions snapshot
//! the tables on begin and restore the snapshot on rollback. Raw SQL is not
//! available.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::context::StorageContext;
use crate::criteria::Query;
use crate::entity::{no_primary_key, record_fields, Entity, Key};
use crate::error::DataError;
use crate::predicate::{Predicate, Tracking};
use crate::relation::{RelationLoader, RelationRegistry};

type Row = Map<String, Value>;

#[derive(Debug, Clone, Default)]
struct Tables {
    tables: HashMap<&'static str, IndexMap<String, Row>>,
}

#[derive(Debug)]
enum Write {
    Insert,
    Update,
    Delete,
}

#[derive(Debug)]
struct Pending {
    write: Write,
    entity: &'static str,
    table: &'static str,
    id: String,
    key: String,
    row: Option<Row>,
}

#[derive(Default)]
struct Inner {
    store: RwLock<Tables>,
    pending: Mutex<Vec<Pending>>,
    snapshot: Mutex<Option<Tables>>,
    tracked: Mutex<HashSet<(&'static str, String)>>,
    saves: AtomicU64,
    relations: RelationRegistry<InMemoryContext>,
    key_overrides: RwLock<HashMap<TypeId, &'static [&'static str]>>,
}

/// Shared handle to an in-process store. Clones see the same data.
#[derive(Clone, Default)]
pub struct InMemoryContext {
    inner: Arc<Inner>,
}

impl InMemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation for eager loading.
    pub fn register_relation<P: Entity>(
        &self,
        loader: impl RelationLoader<P, InMemoryContext> + 'static,
    ) -> Result<(), DataError> {
        self.inner.relations.register(loader)
    }

    /// Use `fields` as the primary key of `T` in place of its declared key.
    pub fn map_primary_key<T: Entity>(&self, fields: &'static [&'static str]) -> Result<(), DataError> {
        self.inner
            .key_overrides
            .write()
            .map_err(|_| poisoned("key overrides"))?
            .insert(TypeId::of::<T>(), fields);
        Ok(())
    }

    /// Number of completed `save` calls.
    pub fn save_count(&self) -> u64 {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Number of distinct records returned by tracked reads.
    pub fn tracked_count(&self) -> usize {
        self.inner.tracked.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Number of staged, unsaved writes.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn rows<T: Entity>(&self) -> Result<Vec<T>, DataError> {
        let store = self.inner.store.read().map_err(|_| poisoned("store"))?;
        let Some(table) = store.tables.get(T::table_name()) else {
            return Ok(Vec::new());
        };
        table.values().map(decode::<T>).collect()
    }

    fn track<T: Entity>(&self, records: &[T]) -> Result<(), DataError> {
        let mut tracked = lock(&self.inner.tracked, "tracked")?;
        for record in records {
            tracked.insert((T::table_name(), self.key_of(record)?.storage_id()));
        }
        Ok(())
    }

    fn stage<T: Entity>(&self, write: Write, record: &T) -> Result<(), DataError> {
        let fields = record_fields(record)?;
        let key = Key::from_fields_named::<T>(self.primary_key_fields::<T>()?, &fields)?;
        let row = match write {
            Write::Delete => None,
            Write::Insert | Write::Update => Some(columns_only::<T>(fields)),
        };
        lock(&self.inner.pending, "pending")?.push(Pending {
            write,
            entity: T::entity_name(),
            table: T::table_name(),
            id: key.storage_id(),
            key: key.to_string(),
            row,
        });
        Ok(())
    }

    fn restore_snapshot(&self) -> Result<bool, DataError> {
        let Some(snapshot) = lock(&self.inner.snapshot, "snapshot")?.take() else {
            return Ok(false);
        };
        *self.inner.store.write().map_err(|_| poisoned("store"))? = snapshot;
        lock(&self.inner.pending, "pending")?.clear();
        lock(&self.inner.tracked, "tracked")?.clear();
        Ok(true)
    }

    fn apply(tables: &mut Tables, pending: Vec<Pending>) -> Result<u64, DataError> {
        let mut affected = 0u64;
        for p in pending {
            let table = tables.tables.entry(p.table).or_default();
            match (p.write, p.row) {
                (Write::Insert, Some(row)) => {
                    if table.contains_key(&p.id) {
                        return Err(DataError::Other(format!(
                            "duplicate key {} for {}",
                            p.key, p.entity
                        )));
                    }
                    table.insert(p.id, row);
                }
                (Write::Update, Some(row)) => match table.get_mut(&p.id) {
                    Some(existing) => *existing = row,
                    None => return Err(not_found(p.entity, p.key)),
                },
                (Write::Delete, _) => {
                    if table.shift_remove(&p.id).is_none() {
                        return Err(not_found(p.entity, p.key));
                    }
                }
                (_, None) => {
                    return Err(DataError::Other(format!(
                        "staged write for {} is missing its row",
                        p.entity
                    )))
                }
            }
            affected += 1;
        }
        Ok(affected)
    }
}

impl StorageContext for InMemoryContext {
    fn primary_key_fields<T: Entity>(&self) -> Result<&'static [&'static str], DataError> {
        let mapped = self
            .inner
            .key_overrides
            .read()
            .map_err(|_| poisoned("key overrides"))?
            .get(&TypeId::of::<T>())
            .copied();
        match mapped.unwrap_or_else(T::primary_key) {
            [] => Err(no_primary_key::<T>()),
            fields => Ok(fields),
        }
    }

    async fn find_by_key<T: Entity>(&self, key: &Key, tracking: Tracking) -> Result<Option<T>, DataError> {
        self.key_filter::<T>(key)?;
        let found = {
            let store = self.inner.store.read().map_err(|_| poisoned("store"))?;
            store
                .tables
                .get(T::table_name())
                .and_then(|table| table.get(&key.storage_id()))
                .map(decode::<T>)
                .transpose()?
        };
        if let (Some(record), true) = (&found, tracking.is_tracked()) {
            self.track(std::slice::from_ref(record))?;
        }
        tracing::debug!(entity = T::entity_name(), key = %key, found = found.is_some(), "find_by_key");
        Ok(found)
    }

    async fn fetch<T: Entity>(&self, query: &Query<T>) -> Result<Vec<T>, DataError> {
        let mut rows = query.apply(self.rows::<T>()?)?;
        self.inner
            .relations
            .load_includes(self, query.includes(), &mut rows)
            .await?;
        if query.tracking_mode().is_tracked() {
            self.track(&rows)?;
        }
        Ok(rows)
    }

    async fn count<T: Entity>(&self, predicate: Option<&Predicate<T>>) -> Result<u64, DataError> {
        let rows = self.rows::<T>()?;
        let count = match predicate {
            None => rows.len(),
            Some(p) => {
                let mut n = 0;
                for row in &rows {
                    if p.evaluate(row)? {
                        n += 1;
                    }
                }
                n
            }
        };
        Ok(count as u64)
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
        let pending = std::mem::take(&mut *lock(&self.inner.pending, "pending")?);
        let affected = {
            let mut store = self.inner.store.write().map_err(|_| poisoned("store"))?;
            let mut staged = store.clone();
            let affected = Self::apply(&mut staged, pending)?;
            *store = staged;
            affected
        };
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(affected, "in-memory save");
        Ok(affected)
    }

    async fn begin_transaction(&self) -> Result<(), DataError> {
        let mut snapshot = lock(&self.inner.snapshot, "snapshot")?;
        if snapshot.is_some() {
            return Err(DataError::TransactionFailed {
                message: "a transaction is already active on this context; nested transactions are not supported".to_string(),
                source: None,
            });
        }
        let store = self.inner.store.read().map_err(|_| poisoned("store"))?;
        *snapshot = Some(store.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<(), DataError> {
        match lock(&self.inner.snapshot, "snapshot")?.take() {
            Some(_) => Ok(()),
            None => Err(no_transaction()),
        }
    }

    async fn rollback(&self) -> Result<(), DataError> {
        if self.restore_snapshot()? {
            Ok(())
        } else {
            Err(no_transaction())
        }
    }

    fn discard_transaction(&self) {
        if let Err(err) = self.restore_snapshot() {
            tracing::warn!(error = %err, "failed to discard in-memory transaction");
        }
    }

    fn in_transaction(&self) -> bool {
        self.inner
            .snapshot
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    async fn execute_raw_query<T: Entity>(&self, _sql: &str, _params: &[Value]) -> Result<Vec<T>, DataError> {
        Err(DataError::Unsupported(
            "InMemoryContext cannot execute raw SQL".to_string(),
        ))
    }

    async fn execute_raw_command(&self, _sql: &str, _params: &[Value]) -> Result<u64, DataError> {
        Err(DataError::Unsupported(
            "InMemoryContext cannot execute raw SQL".to_string(),
        ))
    }
}

fn decode<T: Entity>(row: &Row) -> Result<T, DataError> {
    Ok(serde_json::from_value(Value::Object(row.clone()))?)
}

/// Drop fields that are not persisted columns (relations).
fn columns_only<T: Entity>(mut fields: Row) -> Row {
    let columns = T::columns();
    if columns.is_empty() {
        return fields;
    }
    fields.retain(|name, _| columns.iter().any(|c| c.name == name));
    fields
}

fn lock<'a, V>(mutex: &'a Mutex<V>, what: &'static str) -> Result<MutexGuard<'a, V>, DataError> {
    mutex.lock().map_err(|_| poisoned(what))
}

fn poisoned(what: &'static str) -> DataError {
    DataError::Other(format!("in-memory {what} lock poisoned"))
}

fn not_found(entity: &'static str, key: String) -> DataError {
    DataError::EntityNotFound { entity, key }
}

fn no_transaction() -> DataError {
    DataError::TransactionFailed {
        message: "no active transaction".to_string(),
        source: None,
    }
}
