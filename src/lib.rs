pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod http;
pub mod logger;
pub mod runner;
pub mod spec;

// Re-export commonly used types
pub use error::{AuthMatrixError, Result};
