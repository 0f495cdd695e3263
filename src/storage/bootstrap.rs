//! Bootstrap Configuration Store
//!
//! Persists the connection descriptor encrypted at `bootstrap_db.json` and
//! answers whether the described database is actually reachable.
//!
//! Loading never fails outward: a missing file, an unreadable file, or a
//! blob that does not decrypt under the current passphrase all mean "no
//! configuration", and the host falls back to local storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::database::{Connector, DbConnection};
use crate::models::descriptor::ConnectionDescriptor;
use crate::models::settings::RetryPolicy;
use crate::services::encryption::EncryptionCodec;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{bootstrap_path, write_atomic};

/// Default bound on a connectivity probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Encrypted store for the connection descriptor
pub struct BootstrapConfigStore {
    path: PathBuf,
    codec: Arc<EncryptionCodec>,
    write_lock: Mutex<()>,
}

impl BootstrapConfigStore {
    /// Store rooted in the application data directory
    pub fn new(data_dir: &Path, codec: Arc<EncryptionCodec>) -> Self {
        Self::with_path(bootstrap_path(data_dir), codec)
    }

    pub fn with_path(path: PathBuf, codec: Arc<EncryptionCodec>) -> Self {
        Self {
            path,
            codec,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a bootstrap file exists, decryptable or not
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Load the descriptor, or `None` when absent or unusable
    pub async fn load(&self) -> Option<ConnectionDescriptor> {
        match self.try_load().await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(
                    "[BootstrapConfigStore] Ignoring unusable bootstrap config {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Load the descriptor, surfacing why it is unusable.
    ///
    /// `Ok(None)` means the file does not exist.
    pub async fn try_load(&self) -> AppResult<Option<ConnectionDescriptor>> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!("[BootstrapConfigStore] No bootstrap config at {}", self.path.display());
            return Ok(None);
        }

        let blob = tokio::fs::read_to_string(&self.path).await?;
        if blob.trim().is_empty() {
            return Err(AppError::config("bootstrap config is empty"));
        }
        let json = self.codec.decrypt(&blob)?;
        let descriptor: ConnectionDescriptor = serde_json::from_str(&json)?;
        descriptor.validate().map_err(AppError::validation)?;
        Ok(Some(descriptor))
    }

    /// Encrypt and persist `descriptor`, replacing any previous one.
    pub async fn save(&self, descriptor: &ConnectionDescriptor) -> AppResult<()> {
        descriptor.validate().map_err(AppError::validation)?;
        let json = serde_json::to_string_pretty(descriptor)?;
        let blob = self.codec.encrypt(&json)?;

        let _guard = self.write_lock.lock().await;
        write_atomic(&self.path, blob.as_bytes()).await?;
        info!(
            "[BootstrapConfigStore] Saved bootstrap config for {}/{}",
            descriptor.server, descriptor.database
        );
        Ok(())
    }

    /// Remove the stored descriptor. Missing files are not an error.
    pub async fn clear(&self) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("[BootstrapConfigStore] Cleared bootstrap config");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Driver connection string for `descriptor`
    pub fn build_connection_string(descriptor: &ConnectionDescriptor) -> String {
        descriptor.connection_string()
    }

    /// Open one connection and run a trivial query, within `timeout`.
    ///
    /// Never retries. Any failure, cancellation, or timeout yields `false`.
    pub async fn probe_connectivity<C: Connector>(
        connector: Arc<C>,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        match Self::probe(connector, descriptor, timeout, cancel).await {
            Ok(elapsed) => {
                info!(
                    "[BootstrapConfigStore] Probe of {}/{} succeeded in {:?}",
                    descriptor.server, descriptor.database, elapsed
                );
                true
            }
            Err(e) => {
                warn!(
                    "[BootstrapConfigStore] Probe of {}/{} failed: {}",
                    descriptor.server, descriptor.database, e
                );
                false
            }
        }
    }

    /// Probe returning the round-trip time or the failure
    pub async fn probe<C: Connector>(
        connector: Arc<C>,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> AppResult<Duration> {
        let policy = RetryPolicy {
            connection_timeout_secs: timeout.as_secs().max(1),
            command_timeout_secs: timeout.as_secs().max(1),
            ..RetryPolicy::default()
        };
        let descriptor = descriptor.clone();
        let started = Instant::now();

        let handle = tokio::task::spawn_blocking(move || -> AppResult<()> {
            let mut conn = connector.connect(&descriptor, &policy)?;
            conn.ping()
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            joined = tokio::time::timeout(timeout, handle) => match joined {
                Err(_) => Err(AppError::connectivity(format!("probe timed out after {:?}", timeout))),
                Ok(Err(join_err)) => Err(AppError::internal(format!("probe task failed: {}", join_err))),
                Ok(Ok(result)) => result.map(|_| started.elapsed()),
            },
        }
    }
}
