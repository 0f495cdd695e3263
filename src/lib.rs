//! DeskKit - Persistence Bootstrap Library
//!
//! Startup persistence for desktop line-of-business applications. It includes:
//! - Passphrase-based encryption at rest, plus a rotating key registry for
//!   field-level encryption
//! - Encrypted bootstrap storage for the central database descriptor
//! - Storage mode resolution (Local files vs. central Database) with a
//!   bounded connectivity probe
//! - A resilient database session with classified, bounded retry
//! - Typed application and per-user settings over either backend

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use deskkit_core::{SettingKey, SettingScope, SettingsBackend, StorageMode, ValueType};
pub use models::descriptor::ConnectionDescriptor;
pub use models::response::*;
pub use models::settings::{RetryPolicy, RuntimeConfig};
pub use services::{
    DatabaseSession, EncryptionCodec, HealthCheck, Resolution, ResolutionReason, SettingsFacade,
    StorageModeResolver,
};
pub use state::AppState;
pub use storage::{
    BootstrapConfigStore, Connector, DatabaseSettingsStore, DbConnection, FaultKind,
    LocalKeyValueStore, ResilientConnection, SqliteConnector,
};
pub use utils::error::{AppError, AppResult};
