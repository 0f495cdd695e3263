//! Integration Tests Module
//!
//! End-to-end tests for the DeskKit persistence layer against real files in
//! temporary directories and SQLite databases.

// Startup sequence and storage mode resolution
mod bootstrap_flow_test;

// Settings persistence across process restarts
mod settings_persistence_test;

// Retry, transaction and cancellation behaviour of database sessions
mod resilience_test;
