//! Health Checks
//!
//! Reports whether each persistence component is usable right now.
//! Checks never fail; problems show up as unhealthy entries and a
//! "degraded" overall status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use deskkit_core::StorageMode;
use tokio_util::sync::CancellationToken;

use crate::models::response::{ComponentHealth, HealthResponse};
use crate::storage::bootstrap::BootstrapConfigStore;
use crate::storage::database::Connector;
use crate::storage::local::LocalKeyValueStore;

pub const COMPONENT_LOCAL_SETTINGS: &str = "local_settings";
pub const COMPONENT_BOOTSTRAP: &str = "bootstrap_config";
pub const COMPONENT_DATABASE: &str = "database";

/// Health checker over the persistence components
pub struct HealthCheck<C: Connector> {
    local: Arc<LocalKeyValueStore>,
    bootstrap: Arc<BootstrapConfigStore>,
    connector: Arc<C>,
    probe_timeout: Duration,
}

impl<C: Connector> HealthCheck<C> {
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
        }
    }

    /// Run every check. The database is only probed in Database mode; a
    /// missing bootstrap file only counts against Database mode.
    pub async fn run_all(&self, mode: StorageMode, cancel: &CancellationToken) -> HealthResponse {
        let mut health = HealthResponse {
            storage_mode: mode,
            ..HealthResponse::default()
        };

        health.push(self.check_local_settings().await);
        health.push(self.check_bootstrap_config(mode).await);
        health.push(match mode {
            StorageMode::Database => self.check_database(cancel).await,
            StorageMode::Local => {
                ComponentHealth::healthy(COMPONENT_DATABASE, "Local mode, database not in use")
            }
        });
        health
    }

    pub async fn check_local_settings(&self) -> ComponentHealth {
        let started = Instant::now();
        let check = match self.local.verify_files().await {
            Ok(()) => ComponentHealth::healthy(COMPONENT_LOCAL_SETTINGS, "Settings files readable"),
            Err(e) => ComponentHealth::unhealthy(COMPONENT_LOCAL_SETTINGS, e.to_string()),
        };
        check.with_response_time(started.elapsed())
    }

    pub async fn check_bootstrap_config(&self, mode: StorageMode) -> ComponentHealth {
        let started = Instant::now();
        let check = match self.bootstrap.try_load().await {
            Ok(Some(descriptor)) => ComponentHealth::healthy(
                COMPONENT_BOOTSTRAP,
                format!("Configured for {}/{}", descriptor.server, descriptor.database),
            ),
            Ok(None) if mode == StorageMode::Local => {
                ComponentHealth::healthy(COMPONENT_BOOTSTRAP, "Not configured")
            }
            Ok(None) => ComponentHealth::unhealthy(COMPONENT_BOOTSTRAP, "Bootstrap configuration absent"),
            Err(e) => ComponentHealth::unhealthy(COMPONENT_BOOTSTRAP, e.to_string()),
        };
        check.with_response_time(started.elapsed())
    }

    pub async fn check_database(&self, cancel: &CancellationToken) -> ComponentHealth {
        let Some(descriptor) = self.bootstrap.load().await else {
            return ComponentHealth::unhealthy(COMPONENT_DATABASE, "No database configured");
        };

        match BootstrapConfigStore::probe(self.connector.clone(), &descriptor, self.probe_timeout, cancel)
            .await
        {
            Ok(elapsed) => ComponentHealth::healthy(COMPONENT_DATABASE, "Database reachable")
                .with_response_time(elapsed),
            Err(e) => ComponentHealth::unhealthy(COMPONENT_DATABASE, e.to_string()),
        }
    }
}
