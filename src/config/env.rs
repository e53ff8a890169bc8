//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::models::Config;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file from the current directory if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    /// Load a specific env file if it exists; variables already set win
    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)?;

            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No {} file found, using defaults and CLI arguments", path.display());
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# PMem MLC Bench Configuration
#
# Values here are defaults; environment variables and command-line
# arguments override them.

# Tool locations (bare names are looked up in PATH)
# MLC_PATH=/opt/mlc/Linux/mlc
# IPMCTL_PATH=ipmctl
# NDCTL_PATH=ndctl
# NUMACTL_PATH=numactl
# LSCPU_PATH=lscpu

# DAX-mounted persistent-memory file system
# PMEM_PATH=/mnt/pmem0

# Where result files go (default: results/<timestamp>)
# OUTPUT_DIR=/var/tmp/mlc-results

# Socket number or "all"
# MLC_SOCKET=0

# Tests to run: idle, loaded, ramp, peak, all (comma-separated)
# MLC_TESTS=all

# Ramp/loaded traffic mixes and access patterns
# MLC_TRAFFIC=r,w2,w5,w6
# MLC_PATTERNS=seq,rand

# mlc tuning
# MLC_BUFFER_KIB=400000
# MLC_DURATION=10
# MLC_RAMP_STEP=1
# MLC_TIMEOUT=900
# MLC_AVX512=false

# Enable colored output (true/false)
# ENABLE_COLOR=true
"#.to_string()
    }

    /// Validate a single environment variable value
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let mut scratch = Config::default();
        let owned = value.to_string();
        scratch.merge_from_lookup(|k| if k == key { Some(owned.clone()) } else { None })?;

        match key {
            "MLC_BUFFER_KIB" if scratch.buffer_kib < 4 => {
                Err(AppError::config(format!("MLC_BUFFER_KIB must be at least 4, got: {}", value)))
            }
            "MLC_DURATION" if scratch.duration_secs == 0 => {
                Err(AppError::config("MLC_DURATION must be greater than 0"))
            }
            "MLC_RAMP_STEP" if scratch.ramp_step == 0 => {
                Err(AppError::config("MLC_RAMP_STEP must be greater than 0"))
            }
            "MLC_TIMEOUT" if scratch.timeout_seconds == 0 => {
                Err(AppError::config("MLC_TIMEOUT must be greater than 0"))
            }
            "PMEM_PATH" if !scratch.pmem_path.is_absolute() => {
                Err(AppError::config(format!("PMEM_PATH must be absolute, got: {}", value)))
            }
            _ => Ok(()),
        }
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("MLC_PATH", "mlc binary", "/opt/mlc/Linux/mlc"),
            ("IPMCTL_PATH", "ipmctl binary", "/usr/bin/ipmctl"),
            ("NDCTL_PATH", "ndctl binary", "/usr/bin/ndctl"),
            ("NUMACTL_PATH", "numactl binary", "/usr/bin/numactl"),
            ("LSCPU_PATH", "lscpu binary", "/usr/bin/lscpu"),
            ("PMEM_PATH", "DAX mount point used by mlc", "/mnt/pmem0"),
            ("OUTPUT_DIR", "Directory for result files", "/var/tmp/mlc-results"),
            ("MLC_SOCKET", "Socket number or 'all'", "all"),
            ("MLC_TESTS", "Tests to run (comma-separated)", "idle,ramp"),
            ("MLC_TRAFFIC", "Traffic mixes (comma-separated)", "r,w2"),
            ("MLC_PATTERNS", "Access patterns (comma-separated)", "seq"),
            ("MLC_BUFFER_KIB", "Per-thread buffer size in KiB", "400000"),
            ("MLC_DURATION", "Seconds per mlc measurement", "10"),
            ("MLC_RAMP_STEP", "Cores added per ramp step", "2"),
            ("MLC_TIMEOUT", "Deadline per mlc run in seconds", "900"),
            ("MLC_AVX512", "Use AVX-512 traffic (true/false)", "true"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<16} {}\n", var, description));
            help.push_str(&format!("  {:<16} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Reject the first malformed supported variable in the process environment
    pub fn validate_current_env() -> Result<()> {
        Self::validate_lookup(|key| std::env::var(key).ok())
    }

    /// Reject the first malformed supported variable visible through `lookup`
    pub fn validate_lookup<F>(lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (var_name, _, _) in Self::get_supported_env_vars() {
            if let Some(value) = lookup(var_name) {
                Self::validate_env_var(var_name, &value)?;
            }
        }
        Ok(())
    }

    /// Check the key=value lines of an env file without loading it.
    ///
    /// Lines that a set environment variable would shadow are still checked,
    /// and keys this tool does not know about are reported as likely typos.
    pub fn check_env_file(path: &Path) -> Result<Vec<String>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;
        let known: Vec<&str> = Self::get_supported_env_vars().into_iter().map(|(var, _, _)| var).collect();

        let mut warnings = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim().trim_start_matches("export ").trim();
                    if !known.contains(&key) {
                        warnings.push(format!("{}: unknown variable '{}' is ignored", path.display(), key));
                    } else if let Err(e) = Self::validate_env_var(key, value.trim().trim_matches('"')) {
                        warnings.push(format!("{}: {}", path.display(), e));
                    }
                }
                None => warnings.push(format!("{}: line '{}' is not KEY=value", path.display(), line)),
            }
        }

        Ok(warnings)
    }
}
