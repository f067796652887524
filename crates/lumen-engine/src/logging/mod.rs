//! Logging setup.
//!
//! The engine logs through the `log` facade only; binaries pick the backend.
//! [`init_logging`] wires up `env_logger` for the common case.

mod init;

pub use init::{FILTER_ENV, FilterSource, LoggingConfig, init_logging};
