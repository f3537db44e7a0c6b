//! Request interceptor: one transaction per call, route-configured intent.
//!
//! The unary shape is an axum middleware applied per route group with
//! [`axum::middleware::from_fn_with_state`]; its state, [`TxRoute`], names
//! the pools and the isolation preset. Handlers never pick a pool or an
//! isolation level, and they never see a request whose transaction failed to
//! start.
//!
//! The streaming shape, [`StreamScope`], binds once before a stream handler
//! starts and keeps the same context for every message the stream processes.

use std::future::Future;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use txgate_core::RequestCx;

use crate::error::ApiError;

use super::binder::begin;
use super::context::TxContext;
use super::error::{CallError, TxError};
use super::pool::DbPools;
use super::options::TxOptions;

/// Route-level transaction configuration: which pools to draw from and which
/// preset to begin with. Intent is derived from the preset, never from the
/// handler.
#[derive(Clone)]
pub struct TxRoute {
    pools: DbPools,
    preset: TxOptions,
}

impl TxRoute {
    pub fn new(pools: DbPools, preset: TxOptions) -> Self {
        Self { pools, preset }
    }
}

/// Unary interceptor.
///
/// Begins a transaction on the intent-selected pool, merges the handle into
/// the request's [`TxContext`] (stacked layers may bind both intents on one
/// route), and runs the downstream handler inside the guard:
///
/// - begin failure short-circuits with an infrastructure error response; the
///   handler never runs;
/// - a 4xx/5xx response from the handler rolls back and passes through
///   untouched;
/// - a success response commits; if the commit fails the success response is
///   replaced by the `commit_failed` error response;
/// - a handler panic rolls back and resumes unwinding.
///
/// The decision is made when the handler returns its response. Handlers
/// whose response bodies stream rows lazily must not source them from the
/// transaction; long-lived streaming work belongs in a [`StreamScope`].
pub async fn bind_unary(State(route): State<TxRoute>, mut req: Request, next: Next) -> Response {
    // HTTP cancellation is modelled by future drop; the context only gates
    // the begin window here.
    let cx = RequestCx::active();
    let intent = route.preset.intent();

    let tx = match begin(&cx, route.pools.for_intent(intent), route.preset).await {
        Ok(tx) => tx,
        Err(err) => {
            tracing::error!(?intent, error = %err, "transaction bind failed; rejecting request");
            return ApiError::from(err).into_response();
        }
    };

    let merged = req
        .extensions()
        .get::<TxContext>()
        .cloned()
        .unwrap_or_default()
        .with(intent, tx.clone());
    req.extensions_mut().insert(merged);

    let outcome = tx
        .execute(|_tx| async move {
            let resp = next.run(req).await;
            if resp.status().is_client_error() || resp.status().is_server_error() {
                // Business failure: roll back, hand the response back as-is.
                Err(resp)
            } else {
                Ok(resp)
            }
        })
        .await;

    match outcome {
        Ok(resp) => resp,
        Err(CallError::Handler(resp)) => resp,
        Err(CallError::Infra(err)) => ApiError::from(err).into_response(),
    }
}

/// Streaming interceptor: bind once, observe the same transaction for the
/// whole stream.
///
/// ```ignore
/// let scope = StreamScope::bind(&cx, &pools, TxOptions::READ_ONLY).await?;
/// let result = scope
///     .run(|txcx| async move {
///         while let Some(msg) = inbound.next().await {
///             handle_message(&txcx, msg).await?;
///         }
///         Ok::<_, DbError>(())
///     })
///     .await;
/// ```
pub struct StreamScope {
    tx: super::guard::SharedTx,
    cx: TxContext,
}

impl StreamScope {
    /// Bind a transaction for an incoming stream, before its handler starts.
    pub async fn bind(
        cx: &RequestCx,
        pools: &DbPools,
        preset: TxOptions,
    ) -> Result<Self, TxError> {
        let intent = preset.intent();
        let tx = begin(cx, pools.for_intent(intent), preset).await?;
        let txcx = TxContext::default().with(intent, tx.clone());
        Ok(Self { tx, cx: txcx })
    }

    /// The derived context every message handler should read from.
    pub fn context(&self) -> &TxContext {
        &self.cx
    }

    /// Drive the stream handler to completion under the guard. The handler
    /// receives the scope's context; its terminal outcome - return, error,
    /// or panic - resolves the single bound transaction.
    pub async fn run<T, E, F, Fut>(self, handler: F) -> Result<T, CallError<E>>
    where
        F: FnOnce(TxContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cx = self.cx.clone();
        self.tx.execute(move |_tx| handler(cx)).await
    }
}
