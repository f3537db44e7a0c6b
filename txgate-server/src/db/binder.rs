//! Transaction binder: acquire a connection and open a transaction with the
//! resolved isolation configuration.

use sqlx::PgPool;

use txgate_core::RequestCx;

use super::error::TxError;
use super::guard::{SharedTx, Tx};
use super::options::TxOptions;

/// Begin a transaction on `pool` with `options`.
///
/// A context that is already cancelled fails with
/// [`TxError::ContextInactive`] before any acquisition attempt. While the
/// acquire/BEGIN is in flight, cancellation aborts it rather than blocking on
/// a saturated pool. Acquisition itself may still wait, bounded by the pool's
/// own acquire timeout.
///
/// On any failure no partial handle escapes: the transaction (if one was
/// opened) is rolled back before the error returns.
pub async fn begin(cx: &RequestCx, pool: &PgPool, options: TxOptions) -> Result<SharedTx, TxError> {
    if cx.is_cancelled() {
        return Err(TxError::ContextInactive);
    }

    let mut tx = tokio::select! {
        biased;
        _ = cx.cancelled() => return Err(TxError::ContextInactive),
        begun = pool.begin() => begun.map_err(TxError::StartFailed)?,
    };

    // Transaction modes only apply before the first query, so this is the
    // first statement after BEGIN.
    if let Err(err) = sqlx::query(options.set_transaction_sql())
        .execute(&mut *tx)
        .await
    {
        tracing::error!(error = %err, "failed to configure transaction; rolling back");
        if let Err(rb) = tx.rollback().await {
            tracing::error!(error = %rb, "rollback of unconfigured transaction failed");
        }
        return Err(TxError::StartFailed(err));
    }

    tracing::debug!(
        isolation = ?options.isolation,
        read_only = options.read_only,
        "transaction begun"
    );

    Ok(Tx::bind(tx, options))
}
