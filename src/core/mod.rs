//! Core Module
//!
//! Error type shared by the binary and the library modules.

pub mod error;

pub use error::{MonitorError, Result};
