use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use genrepo_core::ManagedResource;

#[derive(Default)]
struct Ledger {
    committed: AtomicUsize,
    discarded: AtomicUsize,
}

struct Batch {
    ledger: Arc<Ledger>,
}

#[derive(Debug)]
struct BatchError;

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("batch error")
    }
}

impl std::error::Error for BatchError {}

impl ManagedResource<Arc<Ledger>> for Batch {
    type Error = BatchError;

    async fn acquire(state: &Arc<Ledger>) -> Result<Self, Self::Error> {
        Ok(Batch {
            ledger: state.clone(),
        })
    }

    async fn release(self, success: bool) -> Result<(), Self::Error> {
        let counter = if success {
            &self.ledger.committed
        } else {
            &self.ledger.discarded
        };
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn release_reports_outcome() {
    let ledger = Arc::new(Ledger::default());

    let ok = Batch::acquire(&ledger).await.unwrap();
    ok.release(true).await.unwrap();
    let failed = Batch::acquire(&ledger).await.unwrap();
    failed.release(false).await.unwrap();

    assert_eq!(ledger.committed.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.discarded.load(Ordering::SeqCst), 1);
}

#[test]
fn init_tracing_can_be_called_twice() {
    genrepo_core::init_tracing();
    assert!(!genrepo_core::init_tracing());
}
