//! Services
//!
//! Logic layered over storage: encryption, storage mode resolution, typed
//! settings access, and health checks.

pub mod encryption;
pub mod health;
pub mod mode_resolver;
pub mod settings;

pub use encryption::{EncryptionCodec, FieldEncryptionPolicy, FieldEncryptor, KeyManager};
pub use health::HealthCheck;
pub use mode_resolver::{DatabaseSession, Resolution, ResolutionReason, StorageModeResolver};
pub use settings::SettingsFacade;
