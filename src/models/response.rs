//! Response Types
//!
//! Health report types for the diagnostics surface.

use serde::{Deserialize, Serialize};

use deskkit_core::StorageMode;

/// Result of one health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: String,
    pub healthy: bool,
    pub message: String,
    pub response_time_ms: u64,
}

impl ComponentHealth {
    pub fn healthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            healthy: true,
            message: message.into(),
            response_time_ms: 0,
        }
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            healthy: false,
            message: message.into(),
            response_time_ms: 0,
        }
    }

    pub fn with_response_time(mut self, elapsed: std::time::Duration) -> Self {
        self.response_time_ms = elapsed.as_millis() as u64;
        self
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub storage_mode: StorageMode,
    pub checks: Vec<ComponentHealth>,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            service: "deskkit".to_string(),
            storage_mode: StorageMode::Local,
            checks: Vec::new(),
        }
    }
}

impl HealthResponse {
    /// Append a check and recompute the overall status
    pub fn push(&mut self, check: ComponentHealth) {
        self.checks.push(check);
        self.status = if self.checks.iter().all(|c| c.healthy) {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        };
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_degrades() {
        let mut health = HealthResponse::default();
        assert_eq!(health.service, "deskkit");
        health.push(ComponentHealth::healthy("Database", "local mode"));
        assert!(health.is_healthy());
        health.push(ComponentHealth::unhealthy("Settings", "unreadable"));
        assert_eq!(health.status, "degraded");
    }
}
