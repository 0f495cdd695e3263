//! Startup Flow Integration Tests
//!
//! Drives `AppState` through full startup passes:
//! - Fresh data directory resolves to Local with an empty store
//! - Database mode requires a request, a bootstrap descriptor and a reachable server
//! - Every failed prerequisite falls back to Local without an error
//! - Bootstrap config written with one passphrase is invisible under another

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use deskkit::models::descriptor::ConnectionDescriptor;
use deskkit::models::settings::RetryPolicy;
use deskkit::services::mode_resolver::ResolutionReason;
use deskkit::state::AppState;
use deskkit::storage::database::{Connector, SqliteConnector};
use deskkit::utils::error::{AppError, AppResult};
use deskkit::StorageMode;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

const PASSPHRASE: &str = "integration-passphrase";

/// Connector that refuses every connection and counts attempts
struct UnreachableConnector {
    attempts: AtomicU32,
}

impl UnreachableConnector {
    fn new() -> Self {
        Self {
            attempts: AtomicU32::new(0),
        }
    }
}

impl Connector for UnreachableConnector {
    type Connection = rusqlite::Connection;

    fn connect(
        &self,
        _descriptor: &ConnectionDescriptor,
        _policy: &RetryPolicy,
    ) -> AppResult<rusqlite::Connection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::connectivity("A network-related error occurred"))
    }
}

/// Persist a Database request and a descriptor pointing at `db_dir`
async fn configure_database(data_dir: &TempDir, db_dir: &TempDir) {
    let setup = AppState::open(data_dir.path(), PASSPHRASE).unwrap();
    setup.initialize().await.unwrap();
    setup
        .bootstrap()
        .save(&ConnectionDescriptor::integrated(
            db_dir.path().to_string_lossy(),
            "DeskApp",
        ))
        .await
        .unwrap();
    setup
        .resolver()
        .set_requested_mode(StorageMode::Database)
        .await
        .unwrap();
    setup.shutdown().await.unwrap();
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_fresh_directory_starts_local_with_defaults() {
    let data_dir = tempfile::tempdir().unwrap();
    let state = AppState::open(data_dir.path(), PASSPHRASE).unwrap();

    assert_eq!(state.initialize().await.unwrap(), StorageMode::Local);
    let resolution = state.resolver().cached().unwrap();
    assert_eq!(resolution.reason(), ResolutionReason::LocalRequested);

    let settings = state.settings().await.unwrap();
    assert_eq!(settings.get("Display", "Theme", "Light".to_string()).await, "Light");
    assert_eq!(settings.get("Grid", "PageSize", 25u32).await, 25);
}

#[tokio::test]
async fn test_database_mode_when_everything_verifies() {
    let data_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    configure_database(&data_dir, &db_dir).await;

    let state = AppState::open(data_dir.path(), PASSPHRASE).unwrap();
    assert_eq!(state.initialize().await.unwrap(), StorageMode::Database);
    assert_eq!(
        state.resolver().cached().unwrap().reason(),
        ResolutionReason::Verified
    );
    assert!(db_dir.path().join("DeskApp.db").exists());

    let settings = state.settings().await.unwrap();
    settings.set("Display", "Theme", "Dark").await.unwrap();
    assert_eq!(settings.get("Display", "Theme", String::new()).await, "Dark");

    // Database mode leaves the local settings file alone
    assert!(state.local().get_app("Display", "Theme").await.is_none());
    state.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_bootstrap_falls_back_to_local() {
    let data_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    configure_database(&data_dir, &db_dir).await;

    let setup = AppState::open(data_dir.path(), PASSPHRASE).unwrap();
    setup.bootstrap().clear().await.unwrap();

    let state = AppState::open(data_dir.path(), PASSPHRASE).unwrap();
    assert_eq!(state.initialize().await.unwrap(), StorageMode::Local);
    assert_eq!(
        state.resolver().cached().unwrap().reason(),
        ResolutionReason::ConfigAbsent
    );
    assert!(matches!(state.database().await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_unreachable_database_falls_back_to_local_without_retry() {
    let data_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    configure_database(&data_dir, &db_dir).await;

    let connector = Arc::new(UnreachableConnector::new());
    let state = AppState::with_connector(data_dir.path(), PASSPHRASE, connector.clone()).unwrap();

    assert_eq!(state.initialize().await.unwrap(), StorageMode::Local);
    assert_eq!(
        state.resolver().cached().unwrap().reason(),
        ResolutionReason::ProbeFailed
    );
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

    // Settings still work in the fallback mode
    let settings = state.settings().await.unwrap();
    settings.set("Grid", "PageSize", &40).await.unwrap();
    assert_eq!(settings.get("Grid", "PageSize", 0).await, 40);
}

#[tokio::test]
async fn test_other_passphrase_cannot_read_bootstrap() {
    let data_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    configure_database(&data_dir, &db_dir).await;

    let state = AppState::open(data_dir.path(), "some-other-passphrase").unwrap();
    // The requested mode itself is unreadable under this passphrase
    assert_eq!(state.initialize().await.unwrap(), StorageMode::Local);
    assert!(state.bootstrap().exists().await);
    assert!(state.bootstrap().load().await.is_none());
}

#[tokio::test]
async fn test_initialize_twice_probes_once() {
    let data_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    configure_database(&data_dir, &db_dir).await;

    let connector = Arc::new(UnreachableConnector::new());
    let state = AppState::with_connector(data_dir.path(), PASSPHRASE, connector.clone()).unwrap();

    state.initialize().await.unwrap();
    state.initialize().await.unwrap();
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bootstrap_save_is_idempotent() {
    let data_dir = tempfile::tempdir().unwrap();
    let state = AppState::open(data_dir.path(), PASSPHRASE).unwrap();
    let descriptor = ConnectionDescriptor::with_credentials("db01", "DeskApp", "app", "pw").port(1444);

    state.bootstrap().save(&descriptor).await.unwrap();
    state.bootstrap().save(&descriptor).await.unwrap();

    assert_eq!(state.bootstrap().load().await, Some(descriptor.clone()));
    assert_eq!(
        deskkit::BootstrapConfigStore::build_connection_string(&descriptor),
        "Server=db01,1444;Database=DeskApp;User Id=app;Password=pw;TrustServerCertificate=True;"
    );
}

#[tokio::test]
async fn test_sqlite_connector_is_the_default() {
    let data_dir = tempfile::tempdir().unwrap();
    let state: AppState<SqliteConnector> = AppState::open(data_dir.path(), PASSPHRASE).unwrap();
    let health = state.health().await;
    assert!(health.is_healthy());
    assert_eq!(health.storage_mode, StorageMode::Local);
}
