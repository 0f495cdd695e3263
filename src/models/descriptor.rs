//! Connection Descriptor
//!
//! The minimal record needed to locate and authenticate to the central
//! database. Persisted encrypted as `bootstrap_db.json`.

use std::fmt;

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    1433
}

/// Database connection descriptor
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    /// Host or server identifier
    pub server: String,
    /// Database name
    pub database: String,
    /// SQL login, unused with integrated security
    #[serde(default)]
    pub user_id: Option<String>,
    /// SQL password, unused with integrated security
    #[serde(default)]
    pub password: Option<String>,
    /// Authenticate with the OS identity instead of explicit credentials
    #[serde(default)]
    pub integrated_security: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ConnectionDescriptor {
    /// Descriptor using OS-level (trusted) authentication
    pub fn integrated(server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            user_id: None,
            password: None,
            integrated_security: true,
            port: default_port(),
        }
    }

    /// Descriptor using an explicit login
    pub fn with_credentials(
        server: impl Into<String>,
        database: impl Into<String>,
        user_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            user_id: Some(user_id.into()),
            password: Some(password.into()),
            integrated_security: false,
            port: default_port(),
        }
    }

    /// Override the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Build the driver connection string.
    ///
    /// Integrated security omits credentials entirely; otherwise the user id
    /// and password are embedded. Both shapes trust the server certificate.
    pub fn connection_string(&self) -> String {
        if self.integrated_security {
            format!(
                "Server={},{};Database={};Integrated Security=True;TrustServerCertificate=True;",
                self.server, self.port, self.database
            )
        } else {
            format!(
                "Server={},{};Database={};User Id={};Password={};TrustServerCertificate=True;",
                self.server,
                self.port,
                self.database,
                self.user_id.as_deref().unwrap_or_default(),
                self.password.as_deref().unwrap_or_default()
            )
        }
    }

    /// Validate required fields
    pub fn validate(&self) -> Result<(), String> {
        if self.server.trim().is_empty() {
            return Err("server must not be empty".to_string());
        }
        if self.database.trim().is_empty() {
            return Err("database must not be empty".to_string());
        }
        if !self.integrated_security && self.user_id.as_deref().unwrap_or_default().is_empty() {
            return Err("user id is required without integrated security".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("user_id", &self.user_id)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("integrated_security", &self.integrated_security)
            .field("port", &self.port)
            .finish()
    }
}
