//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::{AppError, Result},
    models::Config,
    types::TestMode,
};
use std::path::Path;

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        self.cli.validate().map_err(AppError::validation)?;

        for warning in EnvManager::check_env_file(Path::new(".env"))? {
            eprintln!("Warning: {}", warning);
        }
        EnvManager::load_env_file(self.cli.debug)?;
        EnvManager::validate_current_env()?;

        let mut config = Config::default();
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Build a configuration from defaults and CLI arguments only
    pub fn parse_without_env(&self) -> Result<Config> {
        self.cli.validate().map_err(AppError::validation)?;

        let mut config = Config::default();
        self.apply_cli_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(ref path) = cli.mlc_path {
            config.mlc_path = path.clone();
        }
        if let Some(ref path) = cli.ipmctl_path {
            config.ipmctl_path = path.clone();
        }
        if let Some(ref path) = cli.ndctl_path {
            config.ndctl_path = path.clone();
        }
        if let Some(ref path) = cli.numactl_path {
            config.numactl_path = path.clone();
        }
        if let Some(ref path) = cli.lscpu_path {
            config.lscpu_path = path.clone();
        }
        if let Some(ref path) = cli.pmem_path {
            config.pmem_path = path.clone();
        }
        if let Some(ref dir) = cli.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(socket) = cli.socket {
            config.socket = socket;
        }
        if !cli.tests.is_empty() {
            config.tests = TestMode::expand(&cli.tests);
        }
        if !cli.traffic.is_empty() {
            config.traffic = dedup(&cli.traffic);
        }
        if !cli.pattern.is_empty() {
            config.patterns = dedup(&cli.pattern);
        }
        if let Some(kib) = cli.buffer_size {
            config.buffer_kib = kib;
        }
        if let Some(secs) = cli.duration {
            config.duration_secs = secs;
        }
        if let Some(step) = cli.ramp_step {
            config.ramp_step = step;
        }
        if let Some(secs) = cli.timeout {
            config.timeout_seconds = secs;
        }

        // Flags only ever switch things on; the environment may already have.
        config.avx512 |= cli.avx512;
        config.dry_run = cli.dry_run;
        if cli.no_color {
            config.enable_color = false;
        } else if cli.color {
            config.enable_color = true;
        }
        config.verbose = cli.verbose;
        config.debug = cli.debug;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
        }
    }
}

fn dedup<T: PartialEq + Copy>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(*item);
        }
    }
    out
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let tests: Vec<&str> = config.tests.iter().map(|t| t.as_str()).collect();
    let traffic: Vec<&str> = config.traffic.iter().map(|t| t.tag()).collect();
    let patterns: Vec<&str> = config.patterns.iter().map(|p| p.tag()).collect();

    let summary = [
        format!("mlc: {}", config.mlc_path.display()),
        format!("PMem path: {}", config.pmem_path.display()),
        format!("Output directory: {}", config.output_dir.display()),
        format!("Socket: {}", config.socket),
        format!("Tests: {}", tests.join(", ")),
        format!("Traffic: {}", traffic.join(", ")),
        format!("Patterns: {}", patterns.join(", ")),
        format!("Buffer: {} KiB", config.buffer_kib),
        format!("Duration: {}s", config.duration_secs),
        format!("Ramp step: {}", config.ramp_step),
        format!("Timeout: {}s", config.timeout_seconds),
        format!("AVX-512: {}", config.avx512),
        format!("Dry run: {}", config.dry_run),
        format!("Color Output: {}", config.enable_color),
        format!("Verbose: {}", config.verbose),
        format!("Debug: {}", config.debug),
    ];

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SocketSelection, TrafficType};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "test", "-s", "all", "-p", "/mnt/pmem1", "-o", "/tmp/x",
            "-t", "peak", "--traffic", "w2,w2,r", "-d", "3", "-X", "--no-color", "--verbose",
        ]);
        let config = ConfigParser::new(cli).parse_without_env().unwrap();

        assert_eq!(config.socket, SocketSelection::All);
        assert_eq!(config.pmem_path, PathBuf::from("/mnt/pmem1"));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.tests, vec![TestMode::Peak]);
        assert_eq!(config.traffic, vec![TrafficType::W2, TrafficType::R]);
        assert_eq!(config.duration_secs, 3);
        assert!(config.avx512);
        assert!(!config.enable_color);
        assert!(config.verbose);
    }

    #[test]
    fn test_defaults_without_overrides() {
        let cli = Cli::parse_from(["test"]);
        let config = ConfigParser::new(cli).parse_without_env().unwrap();
        assert_eq!(config.tests.len(), 4);
        assert_eq!(config.mlc_path, PathBuf::from("mlc"));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        let cli = Cli::parse_from(["test", "--color", "--no-color"]);
        let err = ConfigParser::new(cli).parse_without_env().unwrap_err();
        assert_eq!(err.category(), "VALIDATION");
    }

    #[test]
    fn test_invalid_final_config_rejected() {
        let cli = Cli::parse_from(["test", "-p", "relative/path"]);
        assert!(ConfigParser::new(cli).parse_without_env().is_err());

        let cli = Cli::parse_from(["test", "-d", "60", "--timeout", "30"]);
        assert!(ConfigParser::new(cli).parse_without_env().is_err());
    }

    #[test]
    fn test_config_summary() {
        let mut config = Config::default();
        config.duration_secs = 7;
        let summary = display_config_summary(&config);
        assert!(summary.contains("Duration: 7s"));
        assert!(summary.contains("Tests: idle, loaded, ramp, peak"));
        assert!(summary.contains("PMem path: /mnt/pmem0"));
    }
}
