//! Configuration sanity checks that produce warnings instead of errors

use crate::{
    error::Result,
    models::Config,
    system::topology::CpuTopology,
};

/// Buffers below this size risk being served from the CPU caches
const MIN_UNCACHED_BUFFER_KIB: u64 = 100_000;

/// Configuration validator with advanced validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration and collect non-fatal warnings
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_measurement_settings(config));
        warnings.extend(Self::validate_paths(config));
        Ok(warnings)
    }

    /// Warnings that depend on the discovered CPU topology
    pub fn validate_against_topology(config: &Config, topology: &CpuTopology) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.avx512 && !topology.avx512_supported() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("--avx512 requested but '{}' does not report avx512f; mlc may refuse -Z", topology.model_name),
            ));
        }

        if config.runs(crate::types::TestMode::Ramp) && config.ramp_step > topology.cores_per_socket {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Ramp step {} exceeds {} cores per socket; only the full-socket point will run",
                    config.ramp_step, topology.cores_per_socket
                ),
            ));
        }

        if topology.threads_per_core > 1 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Hyper-threading is enabled; ramp and peak runs use one thread per physical core".to_string(),
            ));
        }

        warnings
    }

    fn validate_measurement_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.duration_secs < 5 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Measurement duration of {}s is short; results may be noisy", config.duration_secs),
            ));
        }

        if config.buffer_kib < MIN_UNCACHED_BUFFER_KIB {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Buffer of {} KiB per thread may fit in CPU caches; PMem figures would be optimistic",
                    config.buffer_kib
                ),
            ));
        }

        warnings
    }

    fn validate_paths(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.output_dir.exists() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Output directory {} already exists; existing result files will not be overwritten",
                    config.output_dir.display()
                ),
            ));
        }

        if config.output_dir.starts_with(&config.pmem_path) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Output directory lives on the PMem file system under test".to_string(),
            ));
        }

        warnings
    }
}

/// Severity of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    Info,
    Warning,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Info => "INFO",
            ValidationLevel::Warning => "WARNING",
        }
    }
}

/// A non-fatal configuration finding
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    /// Create a new validation warning
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        if use_color {
            use colored::Colorize;
            let tag = match self.level {
                ValidationLevel::Info => self.level.as_str().blue(),
                ValidationLevel::Warning => self.level.as_str().yellow(),
            };
            format!("[{}] {}", tag, self.message)
        } else {
            format!("[{}] {}", self.level.as_str(), self.message)
        }
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
