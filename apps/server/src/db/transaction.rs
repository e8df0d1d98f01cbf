//! Transaction discipline for mutations

use super::traits::{CatalogStore, CatalogTransaction};
use crate::Result;
use std::future::Future;

/// Run `work` inside a transaction.
///
/// The transaction is handed to `work` and must be handed back with the
/// outcome. `Ok` commits; `Err` rolls back before the error is returned.
/// A failed rollback is logged and the original error still wins.
pub async fn with_transaction<T, F, Fut>(store: &dyn CatalogStore, work: F) -> Result<T>
where
    F: FnOnce(Box<dyn CatalogTransaction>) -> Fut,
    Fut: Future<Output = (Box<dyn CatalogTransaction>, Result<T>)>,
{
    let tx = store.begin().await?;
    let (tx, outcome) = work(tx).await;

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
