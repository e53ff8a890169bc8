//! Data models for configuration and benchmark results

pub mod config;
pub mod results;

// Re-export main model types
pub use config::Config;
pub use results::{ExecutionResults, ExecutionSummary, LatencyPoint, Measurement, TestRecord};
