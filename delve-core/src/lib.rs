//! Delve Core - shared infrastructure for the research engine
//!
//! Error taxonomy, retry and timeout helpers, logging setup, configuration
//! and the capability traits the engine consumes (language model, search,
//! persistence).

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
