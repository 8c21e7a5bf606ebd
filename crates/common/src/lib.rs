//! Common utilities and types shared across healthprobe components.

pub mod error;
pub mod logging;

pub use error::{Error, Result, SsrfError};
