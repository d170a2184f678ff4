//! Scoped acquire/release lifecycle.
//!
//! A [`ManagedResource`] is acquired from some state, used, then released
//! exactly once with the outcome of the work done in between:
//!
//! 1. `acquire(state)` obtains the resource
//! 2. the caller works with it
//! 3. `release(success)` finalizes it (commit on success, undo otherwise)
//!
//! Implementations that cannot guarantee an explicit `release` (the future
//! holding them may be dropped) should undo their work in `Drop`.

use std::future::Future;

#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `ManagedResource<{S}>`",
    note = "implement `acquire()` and `release()` for your type"
)]
pub trait ManagedResource<S>: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Acquire the resource from `state`.
    fn acquire(state: &S) -> impl Future<Output = Result<Self, Self::Error>> + Send;

    /// Release the resource.
    ///
    /// - `success: true`: the scoped work completed, keep its effects
    /// - `success: false`: the scoped work failed, discard its effects
    fn release(self, success: bool) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
