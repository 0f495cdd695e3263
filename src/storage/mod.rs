//! Storage Layer
//!
//! Handles all persistence: the encrypted bootstrap descriptor, local
//! settings files, the database driver seam with its resilient session, the
//! database settings table, and the runtime config file.

pub mod bootstrap;
pub mod config;
pub mod database;
pub mod local;
pub mod resilient;
pub mod settings_db;

pub use bootstrap::*;
pub use config::*;
pub use database::*;
pub use local::*;
pub use resilient::*;
pub use settings_db::*;
