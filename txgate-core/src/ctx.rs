//! Request-scoped cancellation context.
//!
//! An inbound call carries a `RequestCx`; infrastructure that may suspend on
//! its behalf (connection acquisition, transaction begin) checks it before
//! starting and races against it while waiting. Once a transaction is bound,
//! mid-flight cancellation is the handler's concern, not this type's.

use tokio::sync::watch;

/// Cancellation signal for one inbound call.
///
/// Cheap to clone; all clones observe the same signal. A context starts
/// active and can transition to cancelled exactly once, via [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct RequestCx {
    cancelled: watch::Receiver<bool>,
}

/// Owner side of a [`RequestCx`]. Dropping the handle without calling
/// [`CancelHandle::cancel`] leaves the context active forever.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl RequestCx {
    /// Create a cancellable context and its controlling handle.
    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { cancelled: rx }, CancelHandle { tx })
    }

    /// A context that can never be cancelled, for callers without a
    /// cancellation source (tests, startup tasks, plain HTTP requests whose
    /// cancellation is modelled by future drop).
    pub fn active() -> Self {
        use std::sync::OnceLock;
        // One shared never-fired channel; the handle is parked in the static
        // so the sender side stays open for the life of the process.
        static ACTIVE: OnceLock<(RequestCx, CancelHandle)> = OnceLock::new();
        ACTIVE.get_or_init(RequestCx::new).0.clone()
    }

    /// Has this context already been cancelled?
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves when the context is cancelled. If the controlling handle is
    /// dropped without cancelling, this future never resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        // wait_for errs only when the sender is gone; an abandoned handle
        // means "never cancelled", so park forever in that case.
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl CancelHandle {
    /// Fire the cancellation signal. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}
