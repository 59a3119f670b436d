//! Logging infrastructure.
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty formatting
//! - File rotation via `tracing-appender`
//! - Secret scrubbing

pub mod config;
pub mod logger;
pub mod secret_scrubbing;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use secret_scrubbing::SecretScrubbingLayer;
