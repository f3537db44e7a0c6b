//! Intent-scoped transaction context.
//!
//! One `TxContext` travels with each inbound call (for HTTP, in the
//! request's extensions). Each [`TxIntent`] has its own slot, so a call may
//! hold a read-only and a read-write transaction at the same time without
//! either overwriting the other - there is no opaque key map to collide in.

use super::error::TxError;
use super::guard::SharedTx;
use super::options::TxIntent;

/// Per-call association from intent to at most one bound transaction.
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    read_only: Option<SharedTx>,
    read_write: Option<SharedTx>,
}

impl TxContext {
    /// Derive a context with `tx` bound under `intent`. Rebinding an intent
    /// replaces only that slot.
    #[must_use]
    pub fn with(mut self, intent: TxIntent, tx: SharedTx) -> Self {
        match intent {
            TxIntent::ReadOnly => self.read_only = Some(tx),
            TxIntent::ReadWrite => self.read_write = Some(tx),
        }
        self
    }

    /// Non-mutating lookup. An unbound intent is `None`, not an error: code
    /// may deliberately run outside a transaction.
    pub fn get(&self, intent: TxIntent) -> Option<SharedTx> {
        match intent {
            TxIntent::ReadOnly => self.read_only.clone(),
            TxIntent::ReadWrite => self.read_write.clone(),
        }
    }

    /// Lookup for code that cannot run without the transaction. An unbound
    /// intent here means the route configuration never bound one:
    /// [`TxError::MissingIntent`].
    pub fn require(&self, intent: TxIntent) -> Result<SharedTx, TxError> {
        self.get(intent).ok_or(TxError::MissingIntent(intent))
    }
}
