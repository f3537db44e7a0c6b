//! Transaction lifecycle integration tests.
//!
//! These need a live PostgreSQL server. Run with:
//!   DATABASE_URL=postgres://... cargo test -p txgate-server -- --ignored
//!
//! The writer and reader "pools" point at the same database here; pool
//! selection is still exercised because every path goes through
//! `DbPools::for_intent`.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tower::ServiceExt;

use txgate_core::RequestCx;
use txgate_server::db::repos::{NewUser, UserRepo};
use txgate_server::db::{
    begin, migrations, CallError, DbError, DbPools, StreamScope, TxContext, TxError, TxIntent,
    TxOptions, TxState,
};
use txgate_server::{build_router, AppState};

async fn connect(max: u32) -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    PgPoolOptions::new()
        .max_connections(max)
        .connect(&url)
        .await
        .expect("pool creation failed")
}

async fn test_pools() -> DbPools {
    let pool = connect(5).await;
    migrations::run(&pool).await.expect("migrations failed");
    DbPools::from_pools(pool.clone(), pool)
}

fn unique_email(tag: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    format!("{tag}-{nanos}@tx.test")
}

fn new_user(tag: &str) -> NewUser {
    NewUser {
        email: unique_email(tag),
        first_name: "Tx".into(),
        last_name: "Gate".into(),
    }
}

/// Read a user's existence through a fresh read-only transaction.
async fn email_visible(pools: &DbPools, email: &str) -> bool {
    let cx = RequestCx::active();
    let tx = begin(&cx, pools.for_intent(TxIntent::ReadOnly), TxOptions::READ_ONLY)
        .await
        .expect("read tx");
    let found = {
        let mut conn = tx.conn().await.expect("conn");
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *conn)
            .await
            .expect("query");
        row.is_some()
    };
    tx.rollback().await.expect("rollback read tx");
    found
}

#[tokio::test]
#[ignore = "requires database"]
async fn successful_unit_commits_exactly_once() {
    let pools = test_pools().await;
    let cx = RequestCx::active();
    let user = new_user("commit");
    let email = user.email.clone();

    let tx = begin(&cx, pools.for_intent(TxIntent::ReadWrite), TxOptions::STANDARD)
        .await
        .expect("begin");

    let txcx = TxContext::default().with(TxIntent::ReadWrite, tx.clone());
    tx.execute(|_tx| {
        let txcx = txcx.clone();
        async move { UserRepo::create(&txcx, user).await.map(|_| ()) }
    })
    .await
    .expect("unit commits");

    assert_eq!(tx.state().await, TxState::Committed);
    assert!(email_visible(&pools, &email).await, "committed row must be visible");

    // Second terminal decision must be refused.
    assert!(matches!(tx.commit().await, Err(TxError::Completed(TxState::Committed))));
    assert!(matches!(tx.rollback().await, Err(TxError::Completed(TxState::Committed))));
}

#[tokio::test]
#[ignore = "requires database"]
async fn unit_error_rolls_back_and_hides_the_insert() {
    let pools = test_pools().await;
    let cx = RequestCx::active();
    let user = new_user("rollback");
    let email = user.email.clone();

    let tx = begin(&cx, pools.for_intent(TxIntent::ReadWrite), TxOptions::STANDARD)
        .await
        .expect("begin");
    let txcx = TxContext::default().with(TxIntent::ReadWrite, tx.clone());

    // Insert succeeds, then the unit fails: {Begin, insert, Rollback}.
    let out = tx
        .execute(|_tx| {
            let txcx = txcx.clone();
            async move {
                UserRepo::create(&txcx, user).await?;
                Err::<(), DbError>(DbError::NotFound {
                    resource: "user",
                    id: "simulated".into(),
                })
            }
        })
        .await;

    assert!(matches!(out, Err(CallError::Handler(DbError::NotFound { .. }))));
    assert_eq!(tx.state().await, TxState::RolledBack);
    assert!(
        !email_visible(&pools, &email).await,
        "a subsequent read-only transaction must not observe the rolled-back row"
    );
}

#[tokio::test]
#[ignore = "requires database"]
async fn unit_panic_rolls_back_then_resumes_the_fault() {
    let pools = test_pools().await;
    let cx = RequestCx::active();

    let tx = begin(&cx, pools.for_intent(TxIntent::ReadWrite), TxOptions::STANDARD)
        .await
        .expect("begin");

    let observer = tx.clone();
    let fault = true;
    let handle = tokio::spawn(async move {
        tx.execute(|_tx| async move {
            if fault {
                panic!("handler fault");
            }
            Ok::<(), sqlx::Error>(())
        })
        .await
    });

    let join = handle.await;
    assert!(join.is_err(), "the fault must be re-raised, not swallowed");
    assert!(join.unwrap_err().is_panic());
    assert_eq!(observer.state().await, TxState::RolledBack);
}

#[tokio::test]
#[ignore = "requires database"]
async fn dual_intents_bind_distinct_transactions() {
    let pools = test_pools().await;
    let cx = RequestCx::active();
    let user = new_user("dual");
    let email = user.email.clone();

    let rw = begin(&cx, pools.for_intent(TxIntent::ReadWrite), TxOptions::STANDARD)
        .await
        .expect("rw begin");
    let ro = begin(&cx, pools.for_intent(TxIntent::ReadOnly), TxOptions::READ_ONLY)
        .await
        .expect("ro begin");

    let txcx = TxContext::default()
        .with(TxIntent::ReadWrite, rw.clone())
        .with(TxIntent::ReadOnly, ro.clone());

    let got_rw = txcx.get(TxIntent::ReadWrite).expect("rw bound");
    let got_ro = txcx.get(TxIntent::ReadOnly).expect("ro bound");
    assert!(!Arc::ptr_eq(&got_rw, &got_ro), "intents must hold distinct handles");
    assert_eq!(got_rw.options(), TxOptions::STANDARD);
    assert_eq!(got_ro.options(), TxOptions::READ_ONLY);

    // Uncommitted work on the rw side must not leak into the ro side.
    UserRepo::create(&txcx, user).await.expect("insert");
    let seen = {
        let mut conn = got_ro.conn().await.expect("ro conn");
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&mut *conn)
            .await
            .expect("ro query");
        row.is_some()
    };
    assert!(!seen, "read-only transaction observed uncommitted writer state");

    rw.rollback().await.expect("rw rollback");
    ro.rollback().await.expect("ro rollback");
}

#[tokio::test]
#[ignore = "requires database"]
async fn precancelled_context_fails_without_touching_the_pool() {
    // One-connection pool with the connection already checked out: any
    // acquisition attempt would block for the whole 30s acquire timeout.
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .expect("pool creation failed");
    let _held = pool.acquire().await.expect("hold the only connection");

    let (cx, handle) = RequestCx::new();
    handle.cancel();

    let started = Instant::now();
    let err = begin(&cx, &pool, TxOptions::STANDARD).await.unwrap_err();
    assert!(matches!(err, TxError::ContextInactive));
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "a pre-cancelled context must not wait on the saturated pool"
    );
}

#[tokio::test]
#[ignore = "requires database"]
async fn cancellation_aborts_inflight_acquisition() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .expect("pool creation failed");
    let _held = pool.acquire().await.expect("hold the only connection");

    let (cx, handle) = RequestCx::new();
    let started = Instant::now();
    let pending = tokio::spawn(async move { begin(&cx, &pool, TxOptions::STANDARD).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();

    let err = pending.await.expect("begin task").unwrap_err();
    assert!(matches!(err, TxError::ContextInactive));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "cancellation must abort the wait well before the acquire timeout"
    );
}

#[tokio::test]
#[ignore = "requires database"]
async fn commit_failure_is_surfaced_never_swallowed() {
    let pools = test_pools().await;

    // Deferred unique constraint: the violation only fires at COMMIT.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS commit_probe (
            val BIGINT,
            CONSTRAINT commit_probe_unique UNIQUE (val) DEFERRABLE INITIALLY DEFERRED
        )",
    )
    .execute(pools.writer())
    .await
    .expect("probe table");

    let cx = RequestCx::active();
    let tx = begin(&cx, pools.for_intent(TxIntent::ReadWrite), TxOptions::STANDARD)
        .await
        .expect("begin");
    let probe = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos() as i64;

    let out = tx
        .execute(|tx| async move {
            let mut conn = tx.conn().await.map_err(DbError::from)?;
            sqlx::query("INSERT INTO commit_probe (val) VALUES ($1), ($1)")
                .bind(probe)
                .execute(&mut *conn)
                .await
                .map(|_| ())
                .map_err(DbError::from)
        })
        .await;

    match out {
        Err(CallError::Infra(TxError::CommitFailed(_))) => {}
        other => panic!("expected CommitFailed, got {other:?}"),
    }
    assert_eq!(tx.state().await, TxState::RolledBack);
}

#[tokio::test]
#[ignore = "requires database"]
async fn concurrent_executes_serialize_and_never_interleave() {
    let pools = test_pools().await;
    let cx = RequestCx::active();
    let tx = begin(&cx, pools.for_intent(TxIntent::ReadWrite), TxOptions::STANDARD)
        .await
        .expect("begin");

    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let tx = tx.clone();
        let events = events.clone();
        tokio::spawn(async move {
            tx.execute(|_tx| async move {
                events.lock().await.push("first-start");
                tokio::time::sleep(Duration::from_millis(200)).await;
                events.lock().await.push("first-end");
                Ok::<(), sqlx::Error>(())
            })
            .await
        })
    };

    // Give the first unit time to take the work lock.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = {
        let tx = tx.clone();
        let events = events.clone();
        tokio::spawn(async move {
            tx.execute(|_tx| async move {
                events.lock().await.push("second-start");
                Ok::<(), sqlx::Error>(())
            })
            .await
        })
    };

    first.await.expect("first task").expect("first unit commits");
    let second_out = second.await.expect("second task");

    let log = events.lock().await.clone();
    assert_eq!(
        log,
        vec!["first-start", "first-end", "second-start"],
        "second unit must not start until the first completes"
    );
    // The first decision already resolved the transaction; the second unit's
    // commit attempt must observe that instead of deciding again.
    assert!(matches!(
        second_out,
        Err(CallError::Infra(TxError::Completed(TxState::Committed)))
    ));
}

#[tokio::test]
#[ignore = "requires database"]
async fn stream_scope_binds_once_for_every_message() {
    let pools = test_pools().await;
    let cx = RequestCx::active();

    let scope = StreamScope::bind(&cx, &pools, TxOptions::STANDARD)
        .await
        .expect("stream bind");
    let bound = scope
        .context()
        .get(TxIntent::ReadWrite)
        .expect("intent bound before the handler starts");

    let emails: Vec<String> = (0..3).map(|i| unique_email(&format!("stream{i}"))).collect();
    let inbound = emails.clone();
    scope
        .run(|txcx| async move {
            // Three "messages", one transaction.
            for email in inbound {
                UserRepo::create(
                    &txcx,
                    NewUser {
                        email,
                        first_name: "Stream".into(),
                        last_name: "Msg".into(),
                    },
                )
                .await?;
            }
            Ok::<(), DbError>(())
        })
        .await
        .expect("stream commits");

    assert_eq!(bound.state().await, TxState::Committed);
    for email in &emails {
        assert!(email_visible(&pools, email).await);
    }
}

#[tokio::test]
#[ignore = "requires database"]
async fn http_write_then_read_round_trips() {
    let pools = test_pools().await;
    let app = build_router(AppState::new(pools));

    let email = unique_email("http");
    let create = Request::builder()
        .method("POST")
        .uri("/users")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "email": email,
                "first_name": "Ada",
                "last_name": "Lovelace"
            })
            .to_string(),
        ))
        .expect("request");

    let resp = app.clone().oneshot(create).await.expect("create call");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    let created: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    let id = created["id"].as_i64().expect("id");

    // The commit happened in the write request; a fresh read-only request
    // must observe the row.
    let read = Request::builder()
        .uri(format!("/users/{id}"))
        .body(Body::empty())
        .expect("request");
    let resp = app.clone().oneshot(read).await.expect("read call");
    assert_eq!(resp.status(), StatusCode::OK);

    // Handler-level business error: distinct class, 404.
    let missing = Request::builder()
        .uri("/users/999999999")
        .body(Body::empty())
        .expect("request");
    let resp = app.clone().oneshot(missing).await.expect("read call");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
#[ignore = "requires database"]
async fn http_handler_error_rolls_back_the_insert() {
    let pools = test_pools().await;
    let app = build_router(AppState::new(pools.clone()));

    let email = unique_email("http-rollback");
    // A duplicate insert makes the handler fail inside its bound
    // transaction; the 500 response must take the rollback path and leave
    // exactly one committed row behind.
    let seed_email = unique_email("seed");
    let create = |email: &str| {
        Request::builder()
            .method("POST")
            .uri("/users")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "email": email,
                    "first_name": "Dup",
                    "last_name": "User"
                })
                .to_string(),
            ))
            .expect("request")
    };

    let resp = app.clone().oneshot(create(&seed_email)).await.expect("seed");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = app.clone().oneshot(create(&email)).await.expect("create");
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Duplicate insert: handler fails with 500 after the INSERT statement.
    let resp = app.clone().oneshot(create(&email)).await.expect("dup");
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Exactly one committed row with that email.
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = $1")
        .bind(&email)
        .fetch_one(pools.writer())
        .await
        .expect("count");
    assert_eq!(row.0, 1);
}

#[tokio::test]
#[ignore = "requires database"]
async fn begin_failure_short_circuits_with_its_own_error_class() {
    let pools = test_pools().await;
    let app = build_router(AppState::new(pools.clone()));

    // Closing the pools makes every begin fail before any handler runs.
    pools.close().await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/users/1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("call");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(body["error"], "transaction_start_failed");

    // The health probe stays up: it never touches the database.
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("call");
    assert_eq!(resp.status(), StatusCode::OK);
}
