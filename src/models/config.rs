//! Configuration data model and validation

use crate::types::{AccessPattern, AppError, Result, SocketSelection, TestMode, TrafficType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// mlc binary (bare name resolved through PATH)
    #[serde(default = "default_mlc")]
    pub mlc_path: PathBuf,

    #[serde(default = "default_ipmctl")]
    pub ipmctl_path: PathBuf,

    #[serde(default = "default_ndctl")]
    pub ndctl_path: PathBuf,

    #[serde(default = "default_numactl")]
    pub numactl_path: PathBuf,

    #[serde(default = "default_lscpu")]
    pub lscpu_path: PathBuf,

    /// Mount point of the DAX file system
    #[serde(default = "default_pmem_path")]
    pub pmem_path: PathBuf,

    /// Directory receiving the result files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Sockets to benchmark
    #[serde(default)]
    pub socket: SocketSelection,

    /// Selected test modes, `All` already expanded
    #[serde(default = "default_tests")]
    pub tests: Vec<TestMode>,

    /// Traffic mixes for the ramp and loaded-latency runs
    #[serde(default = "default_traffic")]
    pub traffic: Vec<TrafficType>,

    /// Access patterns for the ramp and loaded-latency runs
    #[serde(default = "default_patterns")]
    pub patterns: Vec<AccessPattern>,

    /// Per-thread buffer size in KiB
    #[serde(default = "default_buffer_kib")]
    pub buffer_kib: u64,

    /// mlc measurement time per run
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u32,

    /// Cores added per ramp step
    #[serde(default = "default_ramp_step")]
    pub ramp_step: u32,

    /// Deadline for a single mlc invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    /// Add mlc's AVX-512 flag to bandwidth-generating runs
    #[serde(default)]
    pub avx512: bool,

    /// Print the plan instead of running it
    #[serde(default)]
    pub dry_run: bool,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mlc_path: default_mlc(),
            ipmctl_path: default_ipmctl(),
            ndctl_path: default_ndctl(),
            numactl_path: default_numactl(),
            lscpu_path: default_lscpu(),
            pmem_path: default_pmem_path(),
            output_dir: default_output_dir(),
            socket: SocketSelection::default(),
            tests: default_tests(),
            traffic: default_traffic(),
            patterns: default_patterns(),
            buffer_kib: default_buffer_kib(),
            duration_secs: default_duration_secs(),
            ramp_step: default_ramp_step(),
            timeout_seconds: default_timeout_secs(),
            avx512: false,
            dry_run: false,
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Whether the given test mode is part of this run
    pub fn runs(&self, mode: TestMode) -> bool {
        self.tests.contains(&mode)
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        let tools = [
            ("mlc", &self.mlc_path),
            ("ipmctl", &self.ipmctl_path),
            ("ndctl", &self.ndctl_path),
            ("numactl", &self.numactl_path),
            ("lscpu", &self.lscpu_path),
        ];
        for (name, path) in tools {
            if path.as_os_str().is_empty() {
                return Err(AppError::config(format!("Path to {} cannot be empty", name)));
            }
        }

        if !self.pmem_path.is_absolute() {
            return Err(AppError::config(format!(
                "PMem path must be absolute: {}",
                self.pmem_path.display()
            )));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(AppError::config("Output directory cannot be empty"));
        }

        if self.tests.is_empty() {
            return Err(AppError::config("At least one test must be selected"));
        }
        if self.tests.contains(&TestMode::All) {
            return Err(AppError::internal("Test list must be expanded before validation"));
        }

        if self.traffic.is_empty() {
            return Err(AppError::config("At least one traffic type must be selected"));
        }

        if self.patterns.is_empty() {
            return Err(AppError::config("At least one access pattern must be selected"));
        }

        if self.buffer_kib < 4 {
            return Err(AppError::config("Buffer size must be at least 4 KiB"));
        }

        if self.duration_secs == 0 {
            return Err(AppError::config("Duration must be greater than 0"));
        }

        if self.ramp_step == 0 {
            return Err(AppError::config("Ramp step must be greater than 0"));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }

        if self.timeout_seconds <= u64::from(self.duration_secs) {
            return Err(AppError::config(format!(
                "Timeout ({}s) must exceed the measurement duration ({}s)",
                self.timeout_seconds, self.duration_secs
            )));
        }

        // mlc measures every injection delay for the full duration
        let sweep_secs = self.loaded_sweep_secs();
        if self.runs(TestMode::Loaded) && self.timeout_seconds <= sweep_secs {
            return Err(AppError::config(format!(
                "Timeout ({}s) is too short for a loaded-latency sweep of {} delays x {}s = {}s; raise --timeout or lower --duration",
                self.timeout_seconds,
                crate::defaults::INJECTION_DELAYS.len(),
                self.duration_secs,
                sweep_secs
            )));
        }

        Ok(())
    }

    /// Measurement time of one loaded-latency run
    pub fn loaded_sweep_secs(&self) -> u64 {
        crate::defaults::INJECTION_DELAYS.len() as u64 * u64::from(self.duration_secs)
    }

    /// Merge process environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_lookup(|key| std::env::var(key).ok())
    }

    /// Merge values from an arbitrary key lookup (environment or test map)
    pub fn merge_from_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let paths: [(&str, &mut PathBuf); 7] = [
            ("MLC_PATH", &mut self.mlc_path),
            ("IPMCTL_PATH", &mut self.ipmctl_path),
            ("NDCTL_PATH", &mut self.ndctl_path),
            ("NUMACTL_PATH", &mut self.numactl_path),
            ("LSCPU_PATH", &mut self.lscpu_path),
            ("PMEM_PATH", &mut self.pmem_path),
            ("OUTPUT_DIR", &mut self.output_dir),
        ];
        for (key, target) in paths {
            if let Some(value) = lookup(key) {
                let value = value.trim();
                if !value.is_empty() {
                    *target = PathBuf::from(value);
                }
            }
        }

        if let Some(socket) = lookup("MLC_SOCKET") {
            self.socket = socket.parse()
                .map_err(|e| AppError::config(format!("Invalid MLC_SOCKET value '{}': {}", socket, e)))?;
        }

        // Blank lists keep the defaults, like blank paths above
        if let Some(modes) = lookup_list::<TestMode, _>(&lookup, "MLC_TESTS")? {
            self.tests = TestMode::expand(&modes);
        }

        if let Some(traffic) = lookup_list(&lookup, "MLC_TRAFFIC")? {
            self.traffic = traffic;
        }

        if let Some(patterns) = lookup_list(&lookup, "MLC_PATTERNS")? {
            self.patterns = patterns;
        }

        if let Some(buffer) = lookup("MLC_BUFFER_KIB") {
            self.buffer_kib = buffer.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid MLC_BUFFER_KIB value '{}': {}", buffer, e)))?;
        }

        if let Some(duration) = lookup("MLC_DURATION") {
            self.duration_secs = duration.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid MLC_DURATION value '{}': {}", duration, e)))?;
        }

        if let Some(step) = lookup("MLC_RAMP_STEP") {
            self.ramp_step = step.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid MLC_RAMP_STEP value '{}': {}", step, e)))?;
        }

        if let Some(timeout) = lookup("MLC_TIMEOUT") {
            self.timeout_seconds = timeout.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid MLC_TIMEOUT value '{}': {}", timeout, e)))?;
        }

        if let Some(avx512) = lookup("MLC_AVX512") {
            self.avx512 = avx512.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid MLC_AVX512 value '{}': {}", avx512, e)))?;
        }

        if let Some(enable_color) = lookup("ENABLE_COLOR") {
            self.enable_color = enable_color.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", enable_color, e)))?;
        }

        Ok(())
    }
}

/// Parse a comma-separated list, ignoring empty entries
pub fn parse_list<T>(value: &str) -> Result<Vec<T>>
where
    T: std::str::FromStr<Err = AppError>,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Non-empty list held by environment variable `key`
fn lookup_list<T, F>(lookup: &F, key: &str) -> Result<Option<Vec<T>>>
where
    T: std::str::FromStr<Err = AppError>,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    let items = parse_list(&value)
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
    Ok((!items.is_empty()).then_some(items))
}

// Default value functions for serde
fn default_mlc() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_MLC)
}

fn default_ipmctl() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_IPMCTL)
}

fn default_ndctl() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_NDCTL)
}

fn default_numactl() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_NUMACTL)
}

fn default_lscpu() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_LSCPU)
}

fn default_pmem_path() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_PMEM_PATH)
}

/// `results/<local timestamp>` so consecutive runs never collide
pub fn default_output_dir() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(crate::defaults::DEFAULT_OUTPUT_ROOT).join(stamp.to_string())
}

fn default_tests() -> Vec<TestMode> {
    TestMode::expand(&[TestMode::All])
}

fn default_traffic() -> Vec<TrafficType> {
    TrafficType::ALL.to_vec()
}

fn default_patterns() -> Vec<AccessPattern> {
    AccessPattern::ALL.to_vec()
}

fn default_buffer_kib() -> u64 {
    crate::defaults::DEFAULT_BUFFER_KIB
}

fn default_duration_secs() -> u32 {
    crate::defaults::DEFAULT_DURATION_SECS
}

fn default_ramp_step() -> u32 {
    crate::defaults::DEFAULT_RAMP_STEP
}

fn default_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
