//! Database layer: pools, request-scoped transactions, repositories.
//!
//! # Design
//!
//! - Two pools (writer, reader); intent picks the pool, never call sites.
//! - One transaction per intent per request, bound by the interceptor
//!   before the handler runs and resolved exactly once after it returns.
//! - Repositories never begin, commit, or roll back; they fetch the bound
//!   transaction from [`TxContext`] and issue statements through it.

pub mod binder;
pub mod context;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod migrations;
pub mod options;
pub mod pool;
pub mod repos;

pub use binder::begin;
pub use context::TxContext;
pub use error::{CallError, DbError, TxError};
pub use guard::{SharedTx, Tx, TxState};
pub use interceptor::{bind_unary, StreamScope, TxRoute};
pub use options::{IsolationLevel, TxIntent, TxOptions};
pub use pool::{DbPools, PoolLimits};
