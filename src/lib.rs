//! vidsqueeze video compression library
//!
//! Validates compression submissions, plans encoder invocations and runs
//! them through an ordered list of execution strategies: a local encoder
//! binary first, then an in-process engine, with automatic fallback.

pub mod adapters;
pub mod app;
pub mod artifacts;
pub mod cli;
pub mod config;
pub mod config_initialization;
pub mod domain;
pub mod error;
pub mod planner;
pub mod ports;
pub mod server;
pub mod utils;

// Re-export commonly used types
pub use app::{CompressInteractor, DefaultAppContainer, FallbackController};
pub use config::ServiceConfig;
pub use domain::errors::CompressionError;
pub use domain::model::{CompressionOutput, CompressionRequest, FormFields, TargetFormat};
pub use error::{VidSqueezeError, VidSqueezeResult};
pub use planner::{CommandPlan, CommandPlanner};
