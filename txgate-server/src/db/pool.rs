//! Writer/reader connection pool pair.
//!
//! Uses sqlx `PgPool` with explicit limits per pool. Both targets connect
//! eagerly at startup; a service that cannot reach either endpoint should
//! fail to boot, not limp along.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use txgate_core::PgConfig;

use super::options::TxIntent;

/// Capacity limits for one pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    /// Maximum open connections.
    pub max_open: u32,
    /// Connections kept warm when idle.
    pub min_idle: u32,
    /// Maximum lifetime of a single connection.
    pub max_lifetime: Duration,
    /// Idle time after which a connection is reaped.
    pub idle_timeout: Duration,
    /// How long an acquire may block on a saturated pool.
    pub acquire_timeout: Duration,
}

impl From<&PgConfig> for PoolLimits {
    fn from(cfg: &PgConfig) -> Self {
        Self {
            max_open: cfg.max_open,
            min_idle: cfg.min_idle,
            max_lifetime: cfg.max_lifetime(),
            idle_timeout: cfg.idle_timeout(),
            acquire_timeout: cfg.acquire_timeout(),
        }
    }
}

/// The two pools the service owns: one writer endpoint, one read replica.
///
/// Cheap to clone (`PgPool` is a handle). Pool selection is a single
/// configuration decision: [`TxIntent`] maps to a pool here and nowhere else.
#[derive(Debug, Clone)]
pub struct DbPools {
    writer: PgPool,
    reader: PgPool,
}

impl DbPools {
    /// Open both pools. Either target failing is fatal.
    pub async fn open(writer: &PgConfig, reader: &PgConfig) -> Result<Self, sqlx::Error> {
        let writer_pool = connect(writer).await.map_err(|err| {
            tracing::error!(host = %writer.host, error = %err, "writer pool failed to open");
            err
        })?;
        let reader_pool = connect(reader).await.map_err(|err| {
            tracing::error!(host = %reader.host, error = %err, "reader pool failed to open");
            err
        })?;

        tracing::info!(
            writer = %writer.host,
            reader = %reader.host,
            "connection pools open"
        );

        Ok(Self {
            writer: writer_pool,
            reader: reader_pool,
        })
    }

    /// Wrap already-open pools. Used by tests that build pools directly.
    pub fn from_pools(writer: PgPool, reader: PgPool) -> Self {
        Self { writer, reader }
    }

    pub fn writer(&self) -> &PgPool {
        &self.writer
    }

    pub fn reader(&self) -> &PgPool {
        &self.reader
    }

    /// Uniform intent-to-pool mapping: read-write work goes to the writer,
    /// read-only work to the reader. No call site picks a pool directly.
    pub fn for_intent(&self, intent: TxIntent) -> &PgPool {
        match intent {
            TxIntent::ReadWrite => &self.writer,
            TxIntent::ReadOnly => &self.reader,
        }
    }

    /// Drain both pools at shutdown.
    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}

async fn connect(cfg: &PgConfig) -> Result<PgPool, sqlx::Error> {
    let limits = PoolLimits::from(cfg);
    let options = PgConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .username(&cfg.user)
        .password(&cfg.password)
        .database(&cfg.database)
        .options([("search_path", cfg.schema.as_str())]);

    PgPoolOptions::new()
        .max_connections(limits.max_open)
        .min_connections(limits.min_idle)
        .max_lifetime(limits.max_lifetime)
        .idle_timeout(limits.idle_timeout)
        .acquire_timeout(limits.acquire_timeout)
        // connect_with establishes one connection up front, validating the
        // target before the server starts taking traffic.
        .connect_with(options)
        .await
}
