//! Settings Persistence Integration Tests
//!
//! Values written through the facade must survive a save, a brand-new store
//! instance, and a load, in both storage modes. Nothing readable may reach
//! disk.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use deskkit::models::descriptor::ConnectionDescriptor;
use deskkit::models::settings::RetryPolicy;
use deskkit::services::encryption::EncryptionCodec;
use deskkit::services::settings::SettingsFacade;
use deskkit::storage::database::SqliteConnector;
use deskkit::storage::local::LocalKeyValueStore;
use deskkit::storage::resilient::ResilientConnection;
use deskkit::storage::settings_db::DatabaseSettingsStore;
use deskkit::utils::paths::{app_settings_path, user_settings_path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridPreferences {
    page_size: u32,
    sort_column: String,
    show_archived: bool,
}

fn local_facade(dir: &std::path::Path, passphrase: &str) -> SettingsFacade {
    SettingsFacade::new(Arc::new(LocalKeyValueStore::new(
        dir,
        Arc::new(EncryptionCodec::new(passphrase)),
    )))
}

fn database_facade(db_dir: &std::path::Path, passphrase: &str) -> SettingsFacade {
    let connection = Arc::new(ResilientConnection::new(
        Arc::new(SqliteConnector::new()),
        ConnectionDescriptor::integrated(db_dir.to_string_lossy(), "DeskApp"),
        RetryPolicy::default(),
    ));
    SettingsFacade::new(Arc::new(DatabaseSettingsStore::new(
        connection,
        Arc::new(EncryptionCodec::new(passphrase)),
        CancellationToken::new(),
    )))
}

#[tokio::test]
async fn test_local_round_trip_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let user = Uuid::new_v4();
    let prefs = GridPreferences {
        page_size: 100,
        sort_column: "OrderDate".to_string(),
        show_archived: true,
    };

    {
        let settings = local_facade(dir.path(), "pass");
        settings.load().await.unwrap();
        settings.set("Display", "Theme", "Dark").await.unwrap();
        settings.set("Display", "FontScale", &1.25f64).await.unwrap();
        settings.set_user(user, "Grid", "Orders", &prefs).await.unwrap();
        settings.save().await.unwrap();
    }

    let settings = local_facade(dir.path(), "pass");
    settings.load().await.unwrap();
    assert_eq!(settings.get("Display", "Theme", String::new()).await, "Dark");
    assert_eq!(settings.get("Display", "FontScale", 1.0f64).await, 1.25);
    assert_eq!(
        settings
            .get_user(
                user,
                "Grid",
                "Orders",
                GridPreferences {
                    page_size: 0,
                    sort_column: String::new(),
                    show_archived: false
                }
            )
            .await,
        prefs
    );
}

#[tokio::test]
async fn test_unsaved_changes_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    {
        let settings = local_facade(dir.path(), "pass");
        settings.set("Display", "Theme", "Dark").await.unwrap();
    }

    let settings = local_facade(dir.path(), "pass");
    settings.load().await.unwrap();
    assert_eq!(settings.get("Display", "Theme", "Light".to_string()).await, "Light");
}

#[tokio::test]
async fn test_local_files_contain_no_plaintext_values() {
    let dir = tempfile::tempdir().unwrap();
    let user = Uuid::new_v4();
    let settings = local_facade(dir.path(), "pass");
    settings.set("Mail", "SmtpHost", "smtp.internal.example").await.unwrap();
    settings.set_user(user, "Profile", "Email", "alice@example.com").await.unwrap();
    settings.save().await.unwrap();

    let app = std::fs::read_to_string(app_settings_path(dir.path())).unwrap();
    let users = std::fs::read_to_string(user_settings_path(dir.path())).unwrap();
    assert!(!app.contains("smtp.internal.example"));
    assert!(!users.contains("alice@example.com"));
    assert!(users.contains(&user.to_string()));
}

#[tokio::test]
async fn test_wrong_passphrase_reads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    {
        let settings = local_facade(dir.path(), "right");
        settings.set("Grid", "PageSize", &50).await.unwrap();
        settings.save().await.unwrap();
    }

    let settings = local_facade(dir.path(), "wrong");
    settings.load().await.unwrap();
    assert_eq!(settings.get("Grid", "PageSize", 25).await, 25);
}

#[tokio::test]
async fn test_database_round_trip_across_sessions() {
    let db_dir = tempfile::tempdir().unwrap();
    let user = Uuid::new_v4();

    {
        let settings = database_facade(db_dir.path(), "pass");
        settings.load().await.unwrap();
        settings.set("Display", "Theme", "Dark").await.unwrap();
        settings.set_user(user, "Grid", "PageSize", &75).await.unwrap();
        settings.save().await.unwrap();
    }

    let settings = database_facade(db_dir.path(), "pass");
    settings.load().await.unwrap();
    assert_eq!(settings.get("Display", "Theme", String::new()).await, "Dark");
    assert_eq!(settings.get_user(user, "Grid", "PageSize", 0).await, 75);
    assert_eq!(settings.get("Grid", "PageSize", 10).await, 10);
}
