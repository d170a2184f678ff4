//! Transaction scope with guaranteed release.
//!
//! [`TransactionScope`] implements [`ManagedResource`]:
//!
//! - **Acquire:** begins a transaction on the context
//! - **Release (success):** commits
//! - **Release (failure):** rolls back
//! - **Dropped unreleased:** rolls back without awaiting
//!
//! [`GenericRepository::execute_transaction`](crate::GenericRepository) drives
//! a scope around the caller's action and the autosave.

use genrepo_core::ManagedResource;

use crate::context::StorageContext;
use crate::error::DataError;

pub struct TransactionScope<C: StorageContext> {
    ctx: C,
    released: bool,
}

impl<C: StorageContext> TransactionScope<C> {
    pub fn context(&self) -> &C {
        &self.ctx
    }
}

impl<C> ManagedResource<C> for TransactionScope<C>
where
    C: StorageContext + Clone,
{
    type Error = DataError;

    async fn acquire(ctx: &C) -> Result<Self, Self::Error> {
        ctx.begin_transaction().await?;
        tracing::debug!("transaction started");
        Ok(Self {
            ctx: ctx.clone(),
            released: false,
        })
    }

    async fn release(mut self, success: bool) -> Result<(), Self::Error> {
        let result = if success {
            self.ctx.commit().await
        } else {
            self.ctx.rollback().await
        };
        self.released = true;
        match &result {
            Ok(()) if success => tracing::debug!("transaction committed"),
            Ok(()) => tracing::warn!("transaction rolled back"),
            Err(err) => tracing::warn!(error = %err, success, "transaction release failed"),
        }
        result
    }
}

impl<C: StorageContext> Drop for TransactionScope<C> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("transaction scope dropped before release, rolling back");
            self.ctx.discard_transaction();
        }
    }
}
