// ABOUTME: Library root for shipwright - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod lock;
pub mod logging;
pub mod monitor;
pub mod output;
pub mod platform;
pub mod resilience;
pub mod store;
pub mod types;
