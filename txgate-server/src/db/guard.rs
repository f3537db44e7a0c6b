//! Transaction handle and commit/rollback guard.
//!
//! A [`Tx`] wraps one live `sqlx` transaction behind two locks:
//!
//! - the *slot* lock serializes statement access ([`Tx::conn`]) and protects
//!   the terminal-state machine;
//! - the *work* lock serializes whole units of work ([`Tx::execute`]), so two
//!   executions on the same handle can never interleave statements.
//!
//! Exactly one of commit/rollback ever applies to a handle: the transaction
//! is physically taken out of the slot on the first terminal decision, and
//! every later attempt observes [`TxError::Completed`].
//!
//! The work lock is not reentrant. Nested logic must fetch the existing
//! handle from the request's [`TxContext`](super::TxContext) and issue
//! statements through [`Tx::conn`]; a nested `execute` on the same handle
//! deadlocks.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use sqlx::{PgConnection, Postgres, Transaction};
use tokio::sync::{Mutex, MutexGuard};

use super::error::{CallError, TxError};
use super::options::TxOptions;

/// Terminal-state machine for one transaction. At most one transition out of
/// `Open` ever occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    RolledBack,
}

struct TxSlot {
    tx: Option<Transaction<'static, Postgres>>,
    state: TxState,
}

/// A bound transaction. Shared across the request via [`SharedTx`].
pub struct Tx {
    options: TxOptions,
    /// Unit-of-work lock: held for the full duration of [`Tx::execute`].
    work: Mutex<()>,
    /// Statement/terminal lock: held per [`Tx::conn`] borrow and per
    /// terminal decision.
    slot: Mutex<TxSlot>,
}

/// Cheap-to-clone handle to a bound transaction.
pub type SharedTx = Arc<Tx>;

/// Exclusive access to the transaction's connection. Holding a `TxConn`
/// blocks every other statement on the same transaction until it drops.
pub struct TxConn<'a> {
    slot: MutexGuard<'a, TxSlot>,
}

impl Deref for TxConn<'_> {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        // Checked in Tx::conn; the slot cannot empty while the guard is held.
        self.slot.tx.as_deref().expect("transaction live while TxConn exists")
    }
}

impl DerefMut for TxConn<'_> {
    fn deref_mut(&mut self) -> &mut PgConnection {
        self.slot.tx.as_deref_mut().expect("transaction live while TxConn exists")
    }
}

impl Tx {
    pub(crate) fn bind(inner: Transaction<'static, Postgres>, options: TxOptions) -> SharedTx {
        Arc::new(Self {
            options,
            work: Mutex::new(()),
            slot: Mutex::new(TxSlot {
                tx: Some(inner),
                state: TxState::Open,
            }),
        })
    }

    /// The options this transaction was begun with.
    pub fn options(&self) -> TxOptions {
        self.options
    }

    /// Current terminal state.
    pub async fn state(&self) -> TxState {
        self.slot.lock().await.state
    }

    /// Borrow the live connection for issuing statements.
    ///
    /// Fails with [`TxError::Completed`] once the transaction has been
    /// resolved; a repository running after commit is a sequencing bug and
    /// must not silently run outside the transaction.
    pub async fn conn(&self) -> Result<TxConn<'_>, TxError> {
        let slot = self.slot.lock().await;
        if slot.tx.is_none() {
            return Err(TxError::Completed(slot.state));
        }
        Ok(TxConn { slot })
    }

    /// Run one unit of work to a terminal decision, with strict precedence:
    ///
    /// 1. the unit panicked: roll back, then resume the panic (never
    ///    swallowed);
    /// 2. the unit returned `Err`: roll back, return the error untouched;
    /// 3. the unit returned `Ok`: commit; a failed commit surfaces as
    ///    [`TxError::CommitFailed`], never as success.
    ///
    /// The unit receives a clone of the handle and issues statements through
    /// [`Tx::conn`].
    pub async fn execute<T, E, F, Fut>(self: &Arc<Self>, unit: F) -> Result<T, CallError<E>>
    where
        F: FnOnce(SharedTx) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _work = self.work.lock().await;

        let outcome = AssertUnwindSafe(unit(Arc::clone(self))).catch_unwind().await;
        match outcome {
            Err(fault) => {
                tracing::error!("unit of work panicked; rolling back");
                self.rollback_quiet("panic").await;
                std::panic::resume_unwind(fault);
            }
            Ok(Err(err)) => {
                self.rollback_quiet("unit error").await;
                Err(CallError::Handler(err))
            }
            Ok(Ok(value)) => match self.commit().await {
                Ok(()) => Ok(value),
                Err(err) => Err(CallError::Infra(err)),
            },
        }
    }

    /// Commit the transaction. First terminal decision wins; later calls see
    /// [`TxError::Completed`].
    ///
    /// Normal code never calls this directly - the interceptor and
    /// [`Tx::execute`] own the decision.
    pub async fn commit(&self) -> Result<(), TxError> {
        let mut slot = self.slot.lock().await;
        let tx = slot.tx.take().ok_or(TxError::Completed(slot.state))?;
        match tx.commit().await {
            Ok(()) => {
                slot.state = TxState::Committed;
                Ok(())
            }
            Err(err) => {
                // The driver consumed the transaction either way; record the
                // handle as rolled back so no second decision is possible.
                slot.state = TxState::RolledBack;
                Err(TxError::CommitFailed(err))
            }
        }
    }

    /// Roll back the transaction. Same exactly-once contract as
    /// [`Tx::commit`].
    pub async fn rollback(&self) -> Result<(), TxError> {
        let mut slot = self.slot.lock().await;
        let tx = slot.tx.take().ok_or(TxError::Completed(slot.state))?;
        slot.state = TxState::RolledBack;
        if let Err(err) = tx.rollback().await {
            // The connection is broken; the pool will discard it. The unit's
            // own error stays the caller-visible one.
            tracing::error!(error = %err, "rollback failed");
        }
        Ok(())
    }

    /// Rollback on a failure path: report through the log sink without
    /// replacing the error the caller is about to receive.
    async fn rollback_quiet(&self, cause: &'static str) {
        if let Err(err) = self.rollback().await {
            tracing::error!(cause, error = %err, "rollback after failed unit did not apply");
        }
    }
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx").field("options", &self.options).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    // The guard cannot be constructed without a live sqlx transaction, so
    // its commit/rollback/panic matrix lives in the integration suite:
    // tests/transaction_flow.rs (requires DATABASE_URL).
}
