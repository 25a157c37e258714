//! ragline core
//!
//! The error type every crate returns, layered configuration for the
//! engine and its backends, and `tracing` subscriber setup.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{AppConfig, EngineConfig};
pub use error::{AppError, AppResult};
