//! The transaction driver every public store operation runs through.
use futures::future::BoxFuture;

use crate::access::AccessObject;
use crate::errors::StoreError;

/// Retry configuration of a single store operation.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    /// How many times a transaction aborted by a transient storage error
    /// (lock contention, deadlock) is re-run before the error surfaces.
    pub max_retries: u32,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Runs a closure between `BEGIN` and `COMMIT`.
///
/// Any returned error rolls the transaction back; transient storage errors
/// additionally re-run the closure up to the configured retry budget. The
/// bodies are create-or-update operations with set-idempotent link inserts,
/// so re-running one is safe.
#[derive(Debug, Default)]
pub(crate) struct TransactionExecutor;

impl TransactionExecutor {
    pub async fn execute<Ctx, T, F>(
        &self,
        access: &mut AccessObject,
        ctx: &Ctx,
        options: &TransactionOptions,
        body: F,
    ) -> Result<T, StoreError>
    where
        Ctx: ?Sized + Sync,
        F: for<'a> Fn(&'a mut AccessObject, &'a Ctx) -> BoxFuture<'a, Result<T, StoreError>>,
    {
        let mut remaining_retries = options.max_retries;
        loop {
            access.begin_transaction().await?;
            match body(access, ctx).await {
                Ok(value) => {
                    access.commit_transaction().await?;
                    return Ok(value);
                }
                Err(e) => {
                    // Roll back best-effort; the original error wins.
                    let _ = access.rollback_transaction().await;
                    if e.is_transient() && remaining_retries > 0 {
                        remaining_retries -= 1;
                        log::debug!(
                            "retrying transaction after transient storage error ({} retries left)",
                            remaining_retries
                        );
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }
}
