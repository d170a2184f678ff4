//! Eager loading of related records.
//!
//! Relations are registered on a storage context and looked up by the name
//! an [`Include`](crate::Include) carries. Loading is a second query over the
//! child table, grouped back onto the parents in process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;

use crate::context::StorageContext;
use crate::criteria::Query;
use crate::entity::{record_fields, Entity};
use crate::error::DataError;
use crate::filter::Filter;

/// Loads one named relation for a slice of parents.
pub trait RelationLoader<P, C>: Send + Sync {
    fn name(&self) -> &'static str;

    fn load<'a>(&'a self, ctx: &'a C, parents: &'a mut [P]) -> BoxFuture<'a, Result<(), DataError>>;
}

/// One-to-many relation: children of type `R` whose `foreign_key` column
/// holds the parent's key.
pub struct HasMany<P, R> {
    name: &'static str,
    foreign_key: &'static str,
    parent_key: fn(&P) -> Value,
    attach: fn(&mut P, Vec<R>),
}

impl<P, R> HasMany<P, R> {
    /// ```ignore
    /// HasMany::new("orders", "customer_id", |c: &Customer| c.id.into(), |c, orders| c.orders = orders)
    /// ```
    pub fn new(
        name: &'static str,
        foreign_key: &'static str,
        parent_key: fn(&P) -> Value,
        attach: fn(&mut P, Vec<R>),
    ) -> Self {
        Self {
            name,
            foreign_key,
            parent_key,
            attach,
        }
    }
}

impl<P, R, C> RelationLoader<P, C> for HasMany<P, R>
where
    P: Entity,
    R: Entity,
    C: StorageContext,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn load<'a>(&'a self, ctx: &'a C, parents: &'a mut [P]) -> BoxFuture<'a, Result<(), DataError>> {
        Box::pin(async move {
            if parents.is_empty() {
                return Ok(());
            }
            let keys: Vec<Value> = parents.iter().map(|p| (self.parent_key)(p)).collect();
            let query = Query::<R>::filtered(Filter::is_in(self.foreign_key, keys.iter().cloned()));
            let children = ctx.fetch(&query).await?;

            let mut grouped: IndexMap<String, Vec<R>> = IndexMap::new();
            for child in children {
                let fk = record_fields(&child)?
                    .remove(self.foreign_key)
                    .unwrap_or(Value::Null);
                grouped.entry(fk.to_string()).or_default().push(child);
            }
            for (parent, key) in parents.iter_mut().zip(&keys) {
                let children = grouped.shift_remove(&key.to_string()).unwrap_or_default();
                (self.attach)(parent, children);
            }
            tracing::debug!(
                relation = self.name,
                parent = P::entity_name(),
                parents = keys.len(),
                "relation loaded"
            );
            Ok(())
        })
    }
}

/// Relations known to a context, keyed by parent type and name.
pub struct RelationRegistry<C> {
    loaders: RwLock<HashMap<(TypeId, &'static str), Box<dyn Any + Send + Sync>>>,
    _marker: PhantomData<fn() -> C>,
}

impl<C: StorageContext> RelationRegistry<C> {
    pub fn new() -> Self {
        Self {
            loaders: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }

    /// Register `loader` for parent type `P`. A later registration with the
    /// same name replaces the earlier one.
    pub fn register<P: Entity>(&self, loader: impl RelationLoader<P, C> + 'static) -> Result<(), DataError> {
        let name = loader.name();
        let loader: Arc<dyn RelationLoader<P, C>> = Arc::new(loader);
        self.loaders
            .write()
            .map_err(|_| poisoned())?
            .insert((TypeId::of::<P>(), name), Box::new(loader));
        Ok(())
    }

    fn get<P: Entity>(&self, name: &'static str) -> Result<Option<Arc<dyn RelationLoader<P, C>>>, DataError> {
        let loaders = self.loaders.read().map_err(|_| poisoned())?;
        Ok(loaders
            .get(&(TypeId::of::<P>(), name))
            .and_then(|boxed| boxed.downcast_ref::<Arc<dyn RelationLoader<P, C>>>())
            .cloned())
    }

    /// Load every named relation onto `parents`. Unknown names are an
    /// `InvalidArgument`.
    pub async fn load_includes<P: Entity>(
        &self,
        ctx: &C,
        includes: &[&'static str],
        parents: &mut [P],
    ) -> Result<(), DataError> {
        for &name in includes {
            let loader = self.get::<P>(name)?.ok_or_else(|| {
                DataError::InvalidArgument(format!(
                    "{} has no registered relation named '{name}'",
                    P::entity_name()
                ))
            })?;
            loader.load(ctx, parents).await?;
        }
        Ok(())
    }
}

impl<C: StorageContext> Default for RelationRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> DataError {
    DataError::Other("relation registry lock poisoned".to_string())
}
