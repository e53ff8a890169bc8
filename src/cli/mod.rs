//! Command-line interface module with topic help

pub mod help;

pub use help::HelpSystem;

use crate::types::{AccessPattern, SocketSelection, TestMode, TrafficType};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// PMem MLC Bench - run Intel Memory Latency Checker against a DAX file system
#[derive(Parser, Debug, Clone)]
#[command(name = "pmem-mlc-bench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Socket to benchmark: a socket number or "all"
    #[arg(short, long, value_parser = parse_socket)]
    pub socket: Option<SocketSelection>,

    /// Path to the mlc binary
    #[arg(short = 'm', long = "mlc", value_name = "PATH")]
    pub mlc_path: Option<PathBuf>,

    /// Path to the ipmctl binary
    #[arg(long = "ipmctl", value_name = "PATH")]
    pub ipmctl_path: Option<PathBuf>,

    /// Path to the ndctl binary
    #[arg(long = "ndctl", value_name = "PATH")]
    pub ndctl_path: Option<PathBuf>,

    /// Path to the numactl binary
    #[arg(long = "numactl", value_name = "PATH")]
    pub numactl_path: Option<PathBuf>,

    /// Path to the lscpu binary
    #[arg(long = "lscpu", value_name = "PATH")]
    pub lscpu_path: Option<PathBuf>,

    /// Mount point of the DAX file system mlc writes its buffers to
    #[arg(short = 'p', long, value_name = "DIR")]
    pub pmem_path: Option<PathBuf>,

    /// Directory for result files (default: ./results/<timestamp>)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Generate traffic with AVX-512 instructions
    #[arg(short = 'X', long)]
    pub avx512: bool,

    /// Test to run (can be used multiple times)
    #[arg(short = 't', long = "test", value_enum, action = ArgAction::Append)]
    pub tests: Vec<TestMode>,

    /// Traffic mixes for the bandwidth ramp (comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub traffic: Vec<TrafficType>,

    /// Access patterns for the bandwidth ramp (comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub pattern: Vec<AccessPattern>,

    /// Per-thread buffer size in KiB
    #[arg(short = 'b', long, value_parser = parse_buffer_size)]
    pub buffer_size: Option<u64>,

    /// Measurement time per mlc run in seconds
    #[arg(short = 'd', long, value_parser = parse_duration)]
    pub duration: Option<u32>,

    /// Number of cores added at each ramp step
    #[arg(long, value_parser = parse_ramp_step)]
    pub ramp_step: Option<u32>,

    /// Abort an mlc run that takes longer than this many seconds
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<u64>,

    /// Print the planned mlc commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Force colored output
    #[arg(long)]
    pub color: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Show help for specific topic (tests, preflight, output, env, examples)
    #[arg(long, value_name = "TOPIC")]
    pub help_topic: Option<String>,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        let runs_ramp = self.tests.is_empty()
            || self.tests.iter().any(|t| matches!(t, TestMode::Ramp | TestMode::All));
        if !runs_ramp && self.ramp_step.is_some() {
            return Err("--ramp-step only applies to the ramp test".to_string());
        }

        Ok(())
    }

    /// Check if help should be displayed for a specific topic
    pub fn should_show_topic_help(&self) -> bool {
        self.help_topic.is_some()
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Display help for the specified topic or main help
    pub fn display_help(&self) -> String {
        let help_system = HelpSystem::new();
        let use_colors = self.use_colors();

        if let Some(topic) = &self.help_topic {
            help_system.display_topic_help(topic, use_colors)
                .unwrap_or_else(|| {
                    format!("Unknown help topic: '{}'\n\nAvailable topics: {}\n\n{}",
                        topic, HelpSystem::TOPICS.join(", "), help_system.display_main_help(use_colors))
                })
        } else {
            help_system.display_main_help(use_colors)
        }
    }
}

fn parse_socket(s: &str) -> Result<SocketSelection, String> {
    s.parse::<SocketSelection>().map_err(|e| e.to_string())
}

/// Parse a strictly positive decimal integer, rejecting signs and hex
fn parse_positive(s: &str, what: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid {}: {}", what, s));
    }

    match s.parse::<u64>() {
        Ok(0) => Err(format!("{} must be greater than 0", capitalize(what))),
        Ok(v) => Ok(v),
        Err(_) => Err(format!("Invalid {}: {}", what, s)),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Parse mlc measurement duration in seconds
fn parse_duration(s: &str) -> Result<u32, String> {
    let secs = parse_positive(s, "duration")?;
    if secs > 3600 {
        return Err("Duration cannot exceed 3600 seconds".to_string());
    }
    Ok(secs as u32)
}

/// Parse per-thread buffer size in KiB
fn parse_buffer_size(s: &str) -> Result<u64, String> {
    let kib = parse_positive(s, "buffer size")?;
    if kib < 4 {
        return Err("Buffer size must be at least 4 KiB".to_string());
    }
    Ok(kib)
}

fn parse_ramp_step(s: &str) -> Result<u32, String> {
    let step = parse_positive(s, "ramp step")?;
    u32::try_from(step).map_err(|_| format!("Invalid ramp step: {}", s))
}

fn parse_timeout(s: &str) -> Result<u64, String> {
    let secs = parse_positive(s, "timeout")?;
    if secs > 86_400 {
        return Err("Timeout cannot exceed 86400 seconds".to_string());
    }
    Ok(secs)
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing_basic() {
        let cli = Cli::parse_from(["test", "--socket", "1", "--duration", "5"]);
        assert_eq!(cli.socket, Some(SocketSelection::Single(1)));
        assert_eq!(cli.duration, Some(5));
        assert!(!cli.verbose);
        assert!(!cli.debug);
        assert!(!cli.avx512);
        assert!(cli.tests.is_empty());
    }

    #[test]
    fn test_cli_parsing_all_options() {
        let cli = Cli::parse_from([
            "test",
            "-s", "all",
            "-m", "/opt/mlc/mlc",
            "--ipmctl", "/usr/bin/ipmctl",
            "--ndctl", "/usr/bin/ndctl",
            "--numactl", "/usr/bin/numactl",
            "--lscpu", "/usr/bin/lscpu",
            "-p", "/mnt/pmem1",
            "-o", "/tmp/out",
            "-X",
            "-t", "idle",
            "-t", "ramp",
            "--traffic", "r,w2",
            "--pattern", "rand",
            "-b", "100000",
            "-d", "20",
            "--ramp-step", "4",
            "--timeout", "120",
            "--dry-run",
            "--verbose",
            "--debug",
            "--no-color",
        ]);

        assert_eq!(cli.socket, Some(SocketSelection::All));
        assert_eq!(cli.mlc_path.as_deref(), Some(std::path::Path::new("/opt/mlc/mlc")));
        assert_eq!(cli.pmem_path.as_deref(), Some(std::path::Path::new("/mnt/pmem1")));
        assert!(cli.avx512);
        assert_eq!(cli.tests, vec![TestMode::Idle, TestMode::Ramp]);
        assert_eq!(cli.traffic, vec![TrafficType::R, TrafficType::W2]);
        assert_eq!(cli.pattern, vec![AccessPattern::Random]);
        assert_eq!(cli.buffer_size, Some(100_000));
        assert_eq!(cli.duration, Some(20));
        assert_eq!(cli.ramp_step, Some(4));
        assert_eq!(cli.timeout, Some(120));
        assert!(cli.dry_run);
        assert!(cli.no_color);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Cli::try_parse_from(["test", "--socket", "first"]).is_err());
        assert!(Cli::try_parse_from(["test", "--test", "stream"]).is_err());
        assert!(Cli::try_parse_from(["test", "--traffic", "w9"]).is_err());
        assert!(Cli::try_parse_from(["test", "--duration", "0"]).is_err());
        assert!(Cli::try_parse_from(["test", "--buffer-size", "2"]).is_err());
    }

    #[test]
    fn test_color_conflict() {
        let cli = Cli::parse_from(["test", "--color", "--no-color"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_ramp_step_requires_ramp() {
        let cli = Cli::parse_from(["test", "-t", "idle", "--ramp-step", "2"]);
        assert!(cli.validate().unwrap_err().contains("--ramp-step"));

        let cli = Cli::parse_from(["test", "-t", "all", "--ramp-step", "2"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("10").unwrap(), 10);
        assert_eq!(parse_duration("3600").unwrap(), 3600);
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("3601").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-5").is_err());
        assert!(parse_duration("+5").is_err());
        assert!(parse_duration("0x10").is_err());
    }

    #[test]
    fn test_buffer_and_step_parsing() {
        assert_eq!(parse_buffer_size("4").unwrap(), 4);
        assert!(parse_buffer_size("3").is_err());
        assert_eq!(parse_ramp_step("1").unwrap(), 1);
        assert!(parse_ramp_step("0").unwrap_err().contains("Ramp step must be greater than 0"));
        assert!(parse_timeout("86401").is_err());
    }

    #[test]
    fn test_help_display() {
        let cli = Cli::parse_from(["test", "--no-color"]);
        let help = cli.display_help();
        assert!(help.contains("PMem MLC Bench"));
        assert!(help.contains("USAGE:"));

        let cli_with_topic = Cli::parse_from(["test", "--no-color", "--help-topic", "preflight"]);
        assert!(cli_with_topic.should_show_topic_help());
        assert!(cli_with_topic.display_help().contains("PREFLIGHT CHECKS"));

        let cli_invalid_topic = Cli::parse_from(["test", "--no-color", "--help-topic", "dns"]);
        assert!(cli_invalid_topic.display_help().contains("Unknown help topic"));
    }

    #[test]
    fn test_use_colors_method() {
        let cli_no_color = Cli::parse_from(["test", "--no-color"]);
        assert!(!cli_no_color.use_colors());

        let cli_color = Cli::parse_from(["test", "--color"]);
        assert!(cli_color.use_colors());
    }
}
