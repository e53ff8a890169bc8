//! Type definitions and aliases

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Benchmark families that can be selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    /// Idle (unloaded) latency against the PMem file system
    Idle,
    /// Latency under load across the injection-delay sweep
    Loaded,
    /// Per-socket bandwidth ramp, one core at a time
    Ramp,
    /// Peak injection bandwidth with every core of the socket
    Peak,
    /// Every test above
    All,
}

impl TestMode {
    /// Expand a list of modes, resolving `All` and dropping duplicates while
    /// preserving the canonical run order.
    pub fn expand(modes: &[TestMode]) -> Vec<TestMode> {
        const ORDER: [TestMode; 4] = [TestMode::Idle, TestMode::Loaded, TestMode::Ramp, TestMode::Peak];

        if modes.is_empty() || modes.contains(&TestMode::All) {
            return ORDER.to_vec();
        }
        ORDER.iter().copied().filter(|m| modes.contains(m)).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestMode::Idle => "idle",
            TestMode::Loaded => "loaded",
            TestMode::Ramp => "ramp",
            TestMode::Peak => "peak",
            TestMode::All => "all",
        }
    }
}

impl FromStr for TestMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "loaded" => Ok(Self::Loaded),
            "ramp" | "bandwidth" => Ok(Self::Ramp),
            "peak" => Ok(Self::Peak),
            "all" => Ok(Self::All),
            other => Err(AppError::validation(format!("Unknown test mode: {}", other))),
        }
    }
}

/// Concrete kind of a single mlc invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestKind {
    IdleLatency,
    LoadedLatency,
    BandwidthRamp,
    PeakBandwidth,
}

impl TestKind {
    /// Stem used for result file names
    pub fn file_stem(&self) -> &'static str {
        match self {
            TestKind::IdleLatency => "idle_latency",
            TestKind::LoadedLatency => "loaded_latency",
            TestKind::BandwidthRamp => "bw_ramp",
            TestKind::PeakBandwidth => "peak_bandwidth",
        }
    }

    /// Human-readable name
    pub fn title(&self) -> &'static str {
        match self {
            TestKind::IdleLatency => "Idle Latency",
            TestKind::LoadedLatency => "Loaded Latency",
            TestKind::BandwidthRamp => "Bandwidth Ramp",
            TestKind::PeakBandwidth => "Peak Injection Bandwidth",
        }
    }
}

/// Read/write mix of the traffic-generating threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TrafficType {
    /// All reads
    R,
    /// 2 reads : 1 write
    W2,
    /// 1 read : 1 write
    W5,
    /// 100% non-temporal writes
    W6,
}

impl TrafficType {
    pub const ALL: [TrafficType; 4] = [TrafficType::R, TrafficType::W2, TrafficType::W5, TrafficType::W6];

    /// mlc flag selecting this traffic mix
    pub fn mlc_flag(&self) -> &'static str {
        match self {
            TrafficType::R => "-R",
            TrafficType::W2 => "-W2",
            TrafficType::W5 => "-W5",
            TrafficType::W6 => "-W6",
        }
    }

    /// Short lowercase tag used in file names
    pub fn tag(&self) -> &'static str {
        match self {
            TrafficType::R => "r",
            TrafficType::W2 => "w2",
            TrafficType::W5 => "w5",
            TrafficType::W6 => "w6",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TrafficType::R => "All Reads",
            TrafficType::W2 => "2:1 R/W",
            TrafficType::W5 => "1:1 R/W",
            TrafficType::W6 => "NT Writes",
        }
    }
}

impl FromStr for TrafficType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "r" | "read" | "reads" => Ok(Self::R),
            "w2" => Ok(Self::W2),
            "w5" => Ok(Self::W5),
            "w6" => Ok(Self::W6),
            other => Err(AppError::validation(format!("Unknown traffic type: {}", other))),
        }
    }
}

/// Memory access pattern of the traffic-generating threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AccessPattern {
    #[value(name = "seq")]
    Sequential,
    #[value(name = "rand")]
    Random,
}

impl AccessPattern {
    pub const ALL: [AccessPattern; 2] = [AccessPattern::Sequential, AccessPattern::Random];

    pub fn tag(&self) -> &'static str {
        match self {
            AccessPattern::Sequential => "seq",
            AccessPattern::Random => "rand",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AccessPattern::Sequential => "Sequential",
            AccessPattern::Random => "Random",
        }
    }
}

impl FromStr for AccessPattern {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "seq" | "sequential" => Ok(Self::Sequential),
            "rand" | "random" => Ok(Self::Random),
            other => Err(AppError::validation(format!("Unknown access pattern: {}", other))),
        }
    }
}

/// Which sockets to benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketSelection {
    Single(u32),
    All,
}

impl SocketSelection {
    /// Resolve to concrete socket ids for a machine with `sockets` sockets
    pub fn resolve(&self, sockets: u32) -> Result<Vec<u32>> {
        match *self {
            SocketSelection::All => Ok((0..sockets).collect()),
            SocketSelection::Single(id) if id < sockets => Ok(vec![id]),
            SocketSelection::Single(id) => Err(AppError::validation(format!(
                "Socket {} does not exist (system has {} socket{})",
                id,
                sockets,
                if sockets == 1 { "" } else { "s" }
            ))),
        }
    }
}

impl Default for SocketSelection {
    fn default() -> Self {
        SocketSelection::Single(0)
    }
}

impl fmt::Display for SocketSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketSelection::Single(id) => write!(f, "{}", id),
            SocketSelection::All => write!(f, "all"),
        }
    }
}

impl FromStr for SocketSelection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<u32>()
            .map(Self::Single)
            .map_err(|_| AppError::validation(format!("Invalid socket '{}': expected a number or 'all'", s)))
    }
}

/// Outcome of a single benchmark invocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TestStatus {
    /// mlc exited cleanly and its output was scraped
    Success,
    /// mlc failed or its output was unusable
    Failed,
    /// Planned but not run (dry run or interrupted run)
    Skipped,
    /// mlc exceeded the configured timeout
    Timeout,
}
