//! Application State
//!
//! Owns every persistence component for one process and runs the startup
//! sequence: load local settings, resolve the storage mode, then open the
//! database session only if the resolution verified it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use deskkit_core::StorageMode;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::response::HealthResponse;
use crate::models::settings::RuntimeConfig;
use crate::services::encryption::{
    EncryptionCodec, FieldEncryptionPolicy, FieldEncryptor, KeyManager,
};
use crate::services::health::HealthCheck;
use crate::services::mode_resolver::{DatabaseSession, Resolution, StorageModeResolver};
use crate::services::settings::SettingsFacade;
use crate::storage::bootstrap::BootstrapConfigStore;
use crate::storage::config::ConfigService;
use crate::storage::database::{Connector, SqliteConnector};
use crate::storage::local::LocalKeyValueStore;
use crate::utils::error::{AppError, AppResult};

/// Persistence state for one process
pub struct AppState<C: Connector = SqliteConnector> {
    data_dir: PathBuf,
    config: RuntimeConfig,
    keys: Arc<KeyManager>,
    /// Codec for the key that was current at startup
    codec: Arc<EncryptionCodec>,
    connector: Arc<C>,
    local: Arc<LocalKeyValueStore>,
    bootstrap: Arc<BootstrapConfigStore>,
    resolver: StorageModeResolver<C>,
    /// Settings facade for the resolved mode
    settings: RwLock<Option<SettingsFacade>>,
    /// Present only after a verified Database resolution
    database: RwLock<Option<Arc<DatabaseSession<C>>>>,
    /// Whether the state has been initialized
    initialized: RwLock<bool>,
    cancel: CancellationToken,
}

impl AppState<SqliteConnector> {
    /// State rooted at `data_dir` using the SQLite driver
    pub fn open(data_dir: &Path, passphrase: &str) -> AppResult<Self> {
        Self::with_connector(data_dir, passphrase, Arc::new(SqliteConnector::new()))
    }
}

impl<C: Connector> AppState<C> {
    /// Create an uninitialized state.
    ///
    /// Loads `deskkit.json`, creating the data directory and writing a
    /// default file when it is missing; an unreadable file falls back to
    /// defaults. Settings and the bootstrap file are not touched until
    /// [`AppState::initialize`].
    pub fn with_connector(data_dir: &Path, passphrase: &str, connector: Arc<C>) -> AppResult<Self> {
        if passphrase.is_empty() {
            return Err(AppError::config("encryption passphrase must not be empty"));
        }

        let config = ConfigService::load_or_default(data_dir).config().clone();
        let keys = Arc::new(KeyManager::from_passphrase(passphrase));
        let codec = Arc::new(keys.codec(&keys.current_key_id()?)?);
        let local = Arc::new(LocalKeyValueStore::new(data_dir, codec.clone()));
        let bootstrap = Arc::new(BootstrapConfigStore::new(data_dir, codec.clone()));
        let resolver = StorageModeResolver::new(
            local.clone(),
            bootstrap.clone(),
            connector.clone(),
            config.probe_timeout(),
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            keys,
            codec,
            connector,
            local,
            bootstrap,
            resolver,
            settings: RwLock::new(None),
            database: RwLock::new(None),
            initialized: RwLock::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Run the startup sequence once. Later calls return the mode chosen by
    /// the first.
    pub async fn initialize(&self) -> AppResult<StorageMode> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(self.storage_mode().await);
        }

        if let Err(e) = self.local.load().await {
            warn!("[AppState] Local settings unreadable, starting empty: {}", e);
        }

        let resolution = self.resolver.resolve(&self.cancel).await;
        let facade = match resolution.mode() {
            StorageMode::Database => match self.open_database(&resolution).await {
                Ok(facade) => facade,
                Err(e) => {
                    error!("[AppState] Database session failed to start, using Local: {}", e);
                    self.local_facade()
                }
            },
            StorageMode::Local => self.local_facade(),
        };

        let mode = facade.storage_mode();
        *self.settings.write().await = Some(facade);
        *initialized = true;
        info!("[AppState] Initialized in {} mode", mode);
        Ok(mode)
    }

    async fn open_database(&self, resolution: &Resolution) -> AppResult<SettingsFacade> {
        let session = Arc::new(DatabaseSession::open(
            resolution,
            self.connector.clone(),
            self.config.retry.clone(),
        )?);
        let store = session.settings_store(self.codec.clone(), self.cancel.child_token());
        let facade = SettingsFacade::new(Arc::new(store));
        facade.load().await?;

        *self.database.write().await = Some(session);
        Ok(facade)
    }

    fn local_facade(&self) -> SettingsFacade {
        SettingsFacade::new(self.local.clone())
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.read().await
    }

    /// Effective storage mode; Local until initialized
    pub async fn storage_mode(&self) -> StorageMode {
        self.settings
            .read()
            .await
            .as_ref()
            .map(SettingsFacade::storage_mode)
            .unwrap_or(StorageMode::Local)
    }

    /// Settings facade for the resolved mode
    pub async fn settings(&self) -> AppResult<SettingsFacade> {
        self.settings
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::internal("AppState not initialized"))
    }

    /// The database session, available only in Database mode
    pub async fn database(&self) -> AppResult<Arc<DatabaseSession<C>>> {
        self.database
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::not_found("No database session in Local mode"))
    }

    pub fn resolver(&self) -> &StorageModeResolver<C> {
        &self.resolver
    }

    pub fn bootstrap(&self) -> &Arc<BootstrapConfigStore> {
        &self.bootstrap
    }

    pub fn local(&self) -> &Arc<LocalKeyValueStore> {
        &self.local
    }

    /// Key registry behind settings and field encryption
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Field encryptor over this state's keys
    pub fn field_encryptor(&self, policy: FieldEncryptionPolicy) -> FieldEncryptor {
        FieldEncryptor::new(self.keys.clone(), policy)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Token cancelled by [`AppState::shutdown`]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Health of every persistence component
    pub async fn health(&self) -> HealthResponse {
        HealthCheck::new(
            self.local.clone(),
            self.bootstrap.clone(),
            self.connector.clone(),
            self.config.probe_timeout(),
        )
        .run_all(self.storage_mode().await, &self.cancel)
        .await
    }

    /// Save pending settings, cancel in-flight work and close the database
    /// session.
    pub async fn shutdown(&self) -> AppResult<()> {
        let saved = match self.settings.read().await.as_ref() {
            Some(facade) => facade.save().await,
            None => Ok(()),
        };

        self.cancel.cancel();
        if let Some(session) = self.database.write().await.take() {
            session.close().await;
        }
        info!("[AppState] Shut down");
        saved
    }
}
