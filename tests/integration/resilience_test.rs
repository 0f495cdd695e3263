//! Database Session Resilience Integration Tests
//!
//! Exercises `ResilientConnection` against SQLite and a flaky connector:
//! - Transient failures retry exactly up to the attempt budget
//! - Backoff doubles between attempts
//! - Permanent failures surface after one attempt
//! - Failed transactions leave no partial writes
//! - Cancellation stops retrying

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use deskkit::models::descriptor::ConnectionDescriptor;
use deskkit::models::settings::RetryPolicy;
use deskkit::storage::database::{Connector, DbConnection, SqliteConnector};
use deskkit::storage::resilient::ResilientConnection;
use deskkit::utils::error::{AppError, AppResult};

// ============================================================================
// Helpers
// ============================================================================

/// SQLite connector that fails the first `failures` connects with a
/// transient error
struct FlakyConnector {
    inner: SqliteConnector,
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyConnector {
    fn new(failures: u32) -> Self {
        Self {
            inner: SqliteConnector::new(),
            failures,
            attempts: AtomicU32::new(0),
        }
    }
}

impl Connector for FlakyConnector {
    type Connection = rusqlite::Connection;

    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        policy: &RetryPolicy,
    ) -> AppResult<rusqlite::Connection> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(AppError::database("Connection Timeout Expired"));
        }
        self.inner.connect(descriptor, policy)
    }
}

fn sqlite_session(dir: &std::path::Path, policy: RetryPolicy) -> ResilientConnection<SqliteConnector> {
    ResilientConnection::new(
        Arc::new(SqliteConnector::new()),
        ConnectionDescriptor::integrated(dir.to_string_lossy(), "DeskApp"),
        policy,
    )
}

async fn create_orders_table(conn: &ResilientConnection<SqliteConnector>) {
    conn.run_with_retry(&CancellationToken::new(), |c| {
        c.execute_text(
            "CREATE TABLE orders (id TEXT PRIMARY KEY, customer TEXT NOT NULL)",
            &[],
        )
    })
    .await
    .unwrap();
}

async fn count_orders(conn: &ResilientConnection<SqliteConnector>) -> String {
    conn.run_with_retry(&CancellationToken::new(), |c| {
        c.query_text("SELECT CAST(COUNT(*) AS TEXT) FROM orders", &[])
    })
    .await
    .unwrap()
    .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_always_transient_exhausts_exact_budget() {
    let dir = tempfile::tempdir().unwrap();
    let base = Duration::from_millis(40);
    let conn = sqlite_session(dir.path(), RetryPolicy::new(3, base));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let started = Instant::now();
    let err = conn
        .run_with_retry(&CancellationToken::new(), move |_| -> AppResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::database("A transport-level error has occurred"))
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        AppError::RetryExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(source.to_string().contains("transport-level"));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
    // Backoff of base then 2 * base between the three attempts
    assert!(started.elapsed() >= base * 3);
}

#[tokio::test]
async fn test_flaky_connect_recovers_within_budget() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(FlakyConnector::new(2));
    let conn = ResilientConnection::new(
        connector.clone(),
        ConnectionDescriptor::integrated(dir.path().to_string_lossy(), "DeskApp"),
        RetryPolicy::new(3, Duration::from_millis(5)),
    );

    conn.run_with_retry(&CancellationToken::new(), |c| c.ping())
        .await
        .unwrap();
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);

    // The open connection is reused afterwards
    conn.run_with_retry(&CancellationToken::new(), |c| c.ping())
        .await
        .unwrap();
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_flaky_connect_beyond_budget_fails() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(FlakyConnector::new(5));
    let conn = ResilientConnection::new(
        connector.clone(),
        ConnectionDescriptor::integrated(dir.path().to_string_lossy(), "DeskApp"),
        RetryPolicy::new(3, Duration::from_millis(5)),
    );

    let err = conn.acquire(&CancellationToken::new()).await.err().unwrap();
    assert!(matches!(err, AppError::RetryExhausted { attempts: 3, .. }));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_permanent_failure_surfaces_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let conn = sqlite_session(dir.path(), RetryPolicy::new(5, Duration::from_secs(5)));
    create_orders_table(&conn).await;
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let started = Instant::now();
    let err = conn
        .run_with_retry(&CancellationToken::new(), move |c| {
            counter.fetch_add(1, Ordering::SeqCst);
            c.execute_text("INSERT INTO orders (id) VALUES (?1)", &["o-1"])
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Sqlite(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_failed_transaction_leaves_no_partial_writes() {
    let dir = tempfile::tempdir().unwrap();
    let conn = sqlite_session(dir.path(), RetryPolicy::new(3, Duration::from_millis(5)));
    create_orders_table(&conn).await;

    let err = conn
        .run_in_transaction(&CancellationToken::new(), |c| {
            c.execute_text(
                "INSERT INTO orders (id, customer) VALUES (?1, ?2)",
                &["o-1", "Contoso"],
            )?;
            c.execute_text(
                "INSERT INTO orders (id, customer) VALUES (?1, ?2)",
                &["o-1", "Fabrikam"],
            )
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Transaction { .. }));
    assert_eq!(count_orders(&conn).await, "0");
}

#[tokio::test]
async fn test_transient_transaction_retries_as_a_unit() {
    let dir = tempfile::tempdir().unwrap();
    let conn = sqlite_session(dir.path(), RetryPolicy::new(3, Duration::from_millis(5)));
    create_orders_table(&conn).await;
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    conn.run_in_transaction(&CancellationToken::new(), move |c| {
        c.execute_text(
            "INSERT INTO orders (id, customer) VALUES (?1, ?2)",
            &["o-1", "Contoso"],
        )?;
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(AppError::database("deadlock victim"));
        }
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // The first attempt's insert was rolled back, so exactly one row exists
    assert_eq!(count_orders(&conn).await, "1");
}

#[tokio::test]
async fn test_cancellation_stops_retrying() {
    let dir = tempfile::tempdir().unwrap();
    let conn = sqlite_session(dir.path(), RetryPolicy::new(10, Duration::from_secs(10)));
    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicU32::new(0));

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let counter = calls.clone();
    let started = Instant::now();
    let err = conn
        .run_with_retry(&cancel, move |_| -> AppResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::connectivity("network unreachable"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(10));
}
