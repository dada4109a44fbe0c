//! # alloscope-utils
//!
//! Shared utilities for Alloscope hosts: `tracing`-based logging setup with
//! environment-variable configuration.
//!
//! The core library only *emits* `tracing` events; wiring up a subscriber is
//! the host's job, and this crate is the batteries-included way to do it.

pub mod logging;

pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError};
