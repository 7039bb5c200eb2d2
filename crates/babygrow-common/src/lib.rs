//! # BabyGrow Common
//!
//! Shared setup for BabyGrow binaries.
//!
//! ## Features
//!
//! - Logging configuration and subscriber installation

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
