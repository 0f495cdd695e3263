//! Data Models
//!
//! Contains the data structures shared by the storage and service layers.

pub mod descriptor;
pub mod response;
pub mod settings;

pub use descriptor::*;
pub use response::*;
pub use settings::*;
