//! Error taxonomy for the transaction core.

use thiserror::Error;

use super::guard::TxState;
use super::options::TxIntent;

/// Infrastructure errors raised by the transaction core itself.
///
/// These are deliberately disjoint from handler business errors: the HTTP
/// boundary maps them to their own error classes so a caller can tell "your
/// request was bad" apart from "the database layer failed".
#[derive(Error, Debug)]
pub enum TxError {
    /// The caller's context was cancelled before or during begin. Never
    /// retried here.
    #[error("request context is no longer active")]
    ContextInactive,

    /// A handler asked for an intent the route never bound. This is a route
    /// configuration defect, not a runtime condition to recover from.
    #[error("no {0:?} transaction bound in the request context")]
    MissingIntent(TxIntent),

    /// Connection acquisition or BEGIN failed. The whole call may be retried
    /// by an outer caller; nothing was applied.
    #[error("failed to start transaction")]
    StartFailed(#[source] sqlx::Error),

    /// COMMIT itself failed. Must reach the caller; the work may or may not
    /// have been applied and reporting success would be a lie.
    #[error("failed to commit transaction")]
    CommitFailed(#[source] sqlx::Error),

    /// The transaction already reached a terminal state.
    #[error("transaction already {0:?}")]
    Completed(TxState),
}

/// Outcome of a guarded unit of work: either the infrastructure failed, or
/// the unit itself returned an error (which already triggered rollback).
#[derive(Error, Debug)]
pub enum CallError<E> {
    #[error(transparent)]
    Infra(TxError),

    #[error(transparent)]
    Handler(E),
}

/// Repository-level error: transaction plumbing, driver errors, and the one
/// business condition repositories themselves detect.
#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Tx(#[from] TxError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },
}
