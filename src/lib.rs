//! PMem MLC Bench
//!
//! Drives Intel Memory Latency Checker (`mlc`) against a persistent-memory
//! DAX file system. Validates the platform first (privileges, DIMM health,
//! capacity uniformity, ARS scrub state), derives CPU topology from
//! `lscpu`, then runs idle-latency, loaded-latency, bandwidth-ramp and
//! peak-bandwidth tests one after another, keeping each raw `mlc` output in
//! its own result file.

pub mod app;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod logging;
pub mod mlc;
pub mod models;
pub mod output;
pub mod system;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{Config, Measurement, TestRecord};
pub use output::{OutputFormatter, ColoredFormatter, PlainFormatter, OutputCoordinator, OutputFormatterFactory};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_MLC: &str = "mlc";
    pub const DEFAULT_IPMCTL: &str = "ipmctl";
    pub const DEFAULT_NDCTL: &str = "ndctl";
    pub const DEFAULT_NUMACTL: &str = "numactl";
    pub const DEFAULT_LSCPU: &str = "lscpu";
    pub const DEFAULT_PMEM_PATH: &str = "/mnt/pmem0";
    pub const DEFAULT_OUTPUT_ROOT: &str = "results";

    /// Per-thread buffer size passed to mlc with `-b`, in KiB
    pub const DEFAULT_BUFFER_KIB: u64 = 400_000;
    /// Measurement duration passed to mlc with `-t`, in seconds
    pub const DEFAULT_DURATION_SECS: u32 = 10;
    /// Upper bound on a single mlc invocation
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);
    pub const DEFAULT_RAMP_STEP: u32 = 1;
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    /// Injection delays (in cycles) for the loaded-latency sweep, written to
    /// the delay file handed to mlc via `-D`.
    pub const INJECTION_DELAYS: &[u32] = &[
        0, 2, 8, 15, 50, 100, 200, 300, 400, 500, 700, 1000, 1300, 1700, 2500, 3500, 5000, 9000,
        20000,
    ];

    /// Tools every real run depends on
    pub const REQUIRED_TOOLS: &[&str] = &["mlc", "ipmctl", "ndctl", "numactl", "lscpu"];
}
