//! Storage Mode Resolver
//!
//! Decides once per process whether settings live in local files or the
//! central database. Database mode is chosen only when it was requested,
//! a bootstrap descriptor loads, and a connectivity probe succeeds within
//! the probe timeout. Every other outcome resolves to Local.
//!
//! The only way to open a `DatabaseSession` is from a `Resolution` that
//! carries the verified descriptor, so no database I/O can precede a
//! successful resolution.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use deskkit_core::StorageMode;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::descriptor::ConnectionDescriptor;
use crate::models::settings::RetryPolicy;
use crate::services::encryption::EncryptionCodec;
use crate::storage::bootstrap::BootstrapConfigStore;
use crate::storage::database::Connector;
use crate::storage::local::LocalKeyValueStore;
use crate::storage::resilient::ResilientConnection;
use crate::storage::settings_db::DatabaseSettingsStore;
use crate::utils::error::{AppError, AppResult};

/// Category holding process-wide switches in the local store
pub const SYSTEM_CATEGORY: &str = "System";
/// Key of the requested storage mode
pub const STORAGE_MODE_KEY: &str = "StorageMode";

/// Why a resolution ended where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionReason {
    /// Local mode requested, or nothing requested
    LocalRequested,
    /// Database requested but no usable bootstrap descriptor
    ConfigAbsent,
    /// Database requested but the probe failed or timed out
    ProbeFailed,
    /// Resolution cancelled before the probe completed
    Cancelled,
    /// Database requested and reachable
    Verified,
}

/// Outcome of storage mode resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    reason: ResolutionReason,
    descriptor: Option<ConnectionDescriptor>,
}

impl Resolution {
    fn local(reason: ResolutionReason) -> Self {
        Self {
            reason,
            descriptor: None,
        }
    }

    fn verified(descriptor: ConnectionDescriptor) -> Self {
        Self {
            reason: ResolutionReason::Verified,
            descriptor: Some(descriptor),
        }
    }

    pub fn mode(&self) -> StorageMode {
        if self.descriptor.is_some() {
            StorageMode::Database
        } else {
            StorageMode::Local
        }
    }

    pub fn reason(&self) -> ResolutionReason {
        self.reason
    }

    /// The probed descriptor, present only for Database resolutions
    pub fn descriptor(&self) -> Option<&ConnectionDescriptor> {
        self.descriptor.as_ref()
    }
}

/// Resolves and caches the process storage mode
pub struct StorageModeResolver<C: Connector> {
    local: Arc<LocalKeyValueStore>,
    bootstrap: Arc<BootstrapConfigStore>,
    connector: Arc<C>,
    probe_timeout: Duration,
    resolved: OnceCell<Resolution>,
}

impl<C: Connector> StorageModeResolver<C> {
    /// `local` must already be loaded; the requested mode is read from it.
    pub fn new(
        local: Arc<LocalKeyValueStore>,
        bootstrap: Arc<BootstrapConfigStore>,
        connector: Arc<C>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            local,
            bootstrap,
            connector,
            probe_timeout,
            resolved: OnceCell::new(),
        }
    }

    /// Resolve the storage mode. The first call decides; later calls return
    /// the cached result without probing again.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Resolution {
        self.resolved
            .get_or_init(|| self.resolve_uncached(cancel))
            .await
            .clone()
    }

    pub async fn resolve_mode(&self, cancel: &CancellationToken) -> StorageMode {
        self.resolve(cancel).await.mode()
    }

    /// Cached resolution, if `resolve` has completed
    pub fn cached(&self) -> Option<&Resolution> {
        self.resolved.get()
    }

    /// Mode recorded under `System/StorageMode`; unset or unrecognised reads
    /// as Local.
    pub async fn requested_mode(&self) -> StorageMode {
        let Some(raw) = self.local.get_app(SYSTEM_CATEGORY, STORAGE_MODE_KEY).await else {
            return StorageMode::Local;
        };
        match StorageMode::from_str(raw.trim()) {
            Ok(mode) => mode,
            Err(e) => {
                warn!("[StorageModeResolver] {}, using Local", e);
                StorageMode::Local
            }
        }
    }

    /// Record the requested mode in the local store and save it. Takes
    /// effect at the next startup.
    pub async fn set_requested_mode(&self, mode: StorageMode) -> AppResult<()> {
        self.local
            .set_app(SYSTEM_CATEGORY, STORAGE_MODE_KEY, mode.as_str())
            .await?;
        self.local.save().await?;
        info!("[StorageModeResolver] Requested mode set to {}", mode);
        Ok(())
    }

    async fn resolve_uncached(&self, cancel: &CancellationToken) -> Resolution {
        let resolution = self.decide(cancel).await;
        info!(
            "[StorageModeResolver] Storage mode {} ({:?})",
            resolution.mode(),
            resolution.reason()
        );
        resolution
    }

    async fn decide(&self, cancel: &CancellationToken) -> Resolution {
        if self.requested_mode().await == StorageMode::Local {
            return Resolution::local(ResolutionReason::LocalRequested);
        }

        let Some(descriptor) = self.bootstrap.load().await else {
            warn!("[StorageModeResolver] Database requested but no bootstrap config, using Local");
            return Resolution::local(ResolutionReason::ConfigAbsent);
        };

        if cancel.is_cancelled() {
            return Resolution::local(ResolutionReason::Cancelled);
        }

        let reachable = BootstrapConfigStore::probe_connectivity(
            self.connector.clone(),
            &descriptor,
            self.probe_timeout,
            cancel,
        )
        .await;

        if reachable {
            Resolution::verified(descriptor)
        } else if cancel.is_cancelled() {
            Resolution::local(ResolutionReason::Cancelled)
        } else {
            warn!("[StorageModeResolver] Database unreachable, using Local");
            Resolution::local(ResolutionReason::ProbeFailed)
        }
    }
}

/// Database access for one process, available only after a verified
/// Database resolution.
pub struct DatabaseSession<C: Connector> {
    connection: Arc<ResilientConnection<C>>,
}

impl<C: Connector> DatabaseSession<C> {
    pub fn open(resolution: &Resolution, connector: Arc<C>, policy: RetryPolicy) -> AppResult<Self> {
        let descriptor = resolution.descriptor().ok_or_else(|| {
            AppError::config(format!(
                "database session requires a verified Database resolution, got {:?}",
                resolution.reason()
            ))
        })?;
        Ok(Self {
            connection: Arc::new(ResilientConnection::new(
                connector,
                descriptor.clone(),
                policy,
            )),
        })
    }

    pub fn connection(&self) -> Arc<ResilientConnection<C>> {
        self.connection.clone()
    }

    /// Settings table bound to this session
    pub fn settings_store(
        &self,
        codec: Arc<EncryptionCodec>,
        cancel: CancellationToken,
    ) -> DatabaseSettingsStore<C> {
        DatabaseSettingsStore::new(self.connection.clone(), codec, cancel)
    }

    pub async fn close(&self) {
        self.connection.close().await;
    }
}
