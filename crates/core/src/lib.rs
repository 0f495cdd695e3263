//! DeskKit Core
//!
//! Foundational traits, error types, and storage primitives for the DeskKit
//! workspace. This crate has zero dependencies on driver, crypto, or file
//! system code.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `mode` - `StorageMode` and `SettingScope`
//! - `backend` - `SettingsBackend` trait and `SettingKey` addressing
//!
//! ## Design Principles
//!
//! 1. **No heavy dependencies** - serde/async-trait/thiserror/uuid only
//! 2. **Trait-based abstractions** - the Local and Database stores are interchangeable
//! 3. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod backend;
pub mod error;
pub mod mode;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Storage Primitives ─────────────────────────────────────────────────
pub use backend::{SettingKey, SettingsBackend, ValueType};
pub use mode::{SettingScope, StorageMode};
