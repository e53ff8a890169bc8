//! Topic help with usage examples
//!
//! `--help` is clap's generated reference; this module adds longer,
//! task-oriented pages reachable through `--help-topic`.

use crate::config::env::EnvManager;
use crate::defaults;
use colored::*;

/// Help pages for the CLI application
pub struct HelpSystem {
    version: &'static str,
}

/// A single usage example
struct ExampleHelp {
    description: &'static str,
    command: &'static str,
}

impl ExampleHelp {
    fn format(&self, use_colors: bool) -> String {
        if use_colors {
            format!("  {}\n    $ {}\n", self.description.bright_white(), self.command.green())
        } else {
            format!("  {}\n    $ {}\n", self.description, self.command)
        }
    }
}

impl HelpSystem {
    pub const TOPICS: &'static [&'static str] = &["tests", "preflight", "output", "env", "examples"];

    pub fn new() -> Self {
        Self { version: env!("CARGO_PKG_VERSION") }
    }

    /// Display the main help message
    pub fn display_main_help(&self, use_colors: bool) -> String {
        let mut help = String::new();
        help.push_str(&self.format_header(use_colors));
        help.push('\n');
        help.push_str(&self.section_title("USAGE:", use_colors));
        help.push_str("  pmem-mlc-bench [OPTIONS]\n");
        help.push_str("  pmem-mlc-bench --test ramp --socket all --pmem-path /mnt/pmem1\n");
        help.push_str("  pmem-mlc-bench --help-topic <TOPIC>\n\n");
        help.push_str(&self.section_title("TOPICS:", use_colors));
        for topic in Self::TOPICS {
            help.push_str(&format!("  {}\n", topic));
        }
        help.push('\n');
        help.push_str("Run with --help for the full option reference.\n");
        help
    }

    /// Display help for a specific topic
    pub fn display_topic_help(&self, topic: &str, use_colors: bool) -> Option<String> {
        match topic.to_lowercase().as_str() {
            "tests" | "test" => Some(self.format_tests_help(use_colors)),
            "preflight" | "checks" => Some(self.format_preflight_help(use_colors)),
            "output" | "results" => Some(self.format_output_help(use_colors)),
            "env" | "environment" => Some(self.format_environment_help(use_colors)),
            "examples" => Some(self.format_examples_help(use_colors)),
            _ => None,
        }
    }

    fn format_header(&self, use_colors: bool) -> String {
        let title = "PMem MLC Bench";
        let subtitle = "Intel Memory Latency Checker runs against persistent-memory DAX file systems";
        if use_colors {
            format!("{}\n{}\nVersion: {}\n", title.bright_cyan().bold(), subtitle.bright_blue(), self.version.green())
        } else {
            format!("{}\n{}\nVersion: {}\n", title, subtitle, self.version)
        }
    }

    fn section_title(&self, title: &str, use_colors: bool) -> String {
        if use_colors {
            format!("{}\n", title.bright_green().bold())
        } else {
            format!("{}\n", title)
        }
    }

    fn format_tests_help(&self, use_colors: bool) -> String {
        let mut help = self.section_title("TEST MODES", use_colors);
        help.push_str("  idle    mlc --idle_latency, sequential and random, on the socket's first core\n");
        help.push_str("  loaded  mlc --loaded_latency over the injection-delay sweep\n");
        help.push_str("  ramp    bandwidth with 1..N cores per socket for every traffic mix and pattern\n");
        help.push_str("  peak    mlc --peak_injection_bandwidth with every core of the socket\n");
        help.push_str("  all     every test above (default)\n\n");
        help.push_str("Injection delays (cycles): ");
        let delays: Vec<String> = defaults::INJECTION_DELAYS.iter().map(|d| d.to_string()).collect();
        help.push_str(&delays.join(" "));
        help.push_str("\n\nTraffic mixes: r (all reads), w2 (2:1), w5 (1:1), w6 (non-temporal writes)\n");
        help.push_str("Access patterns: seq, rand\n");
        help.push_str("--avx512 adds mlc's -Z flag to every bandwidth-generating run.\n");
        help
    }

    fn format_preflight_help(&self, use_colors: bool) -> String {
        let mut help = self.section_title("PREFLIGHT CHECKS", use_colors);
        help.push_str("Before any benchmark runs, all of the following must hold:\n\n");
        help.push_str("  1. The process runs as root\n");
        help.push_str(&format!("  2. {} are installed or passed explicitly\n", defaults::REQUIRED_TOOLS.join(", ")));
        help.push_str("  3. --pmem-path is a mount point with the dax option\n");
        help.push_str("  4. ipmctl reports every PMem module as Healthy\n");
        help.push_str("  5. every PMem module has the same capacity\n");
        help.push_str("  6. ndctl reports no Address Range Scrub in progress\n\n");
        help.push_str("Any failure aborts the run. --dry-run skips checks 1 and 3-6.\n");
        help
    }

    fn format_output_help(&self, use_colors: bool) -> String {
        let mut help = self.section_title("OUTPUT FILES", use_colors);
        help.push_str("Every mlc run writes its raw output to one file in the output directory:\n\n");
        help.push_str("  idle_latency_<pattern>_1cpu.txt\n");
        help.push_str("  loaded_latency_<traffic>_<pattern>_<N>cpu.txt\n");
        help.push_str("  bw_ramp_<traffic>_<pattern>_<N>cpu.txt\n");
        help.push_str("  peak_bandwidth_<N>cpu.txt\n\n");
        help.push_str("With --socket all the socket is appended, e.g. bw_ramp_r_seq_4cpu_s1.txt.\n");
        help.push_str("summary.txt holds the scraped tables; sysinfo/ holds lscpu, numactl, ipmctl and ndctl snapshots.\n");
        help.push_str("Existing result files are never overwritten.\n");
        help
    }

    fn format_environment_help(&self, use_colors: bool) -> String {
        let mut help = self.section_title("ENVIRONMENT", use_colors);
        help.push_str(&EnvManager::display_env_help());
        help.push_str("\nSample .env file:\n\n");
        help.push_str(&EnvManager::create_example_env_content());
        help
    }

    fn format_examples_help(&self, use_colors: bool) -> String {
        let examples = [
            ExampleHelp {
                description: "Full suite on socket 0 with defaults",
                command: "pmem-mlc-bench",
            },
            ExampleHelp {
                description: "Bandwidth ramp on every socket, reads only, AVX-512",
                command: "pmem-mlc-bench -t ramp -s all --traffic r -X",
            },
            ExampleHelp {
                description: "Preview the mlc commands for a second PMem mount",
                command: "pmem-mlc-bench -p /mnt/pmem1 -s 1 --dry-run",
            },
            ExampleHelp {
                description: "Use an mlc build outside PATH",
                command: "pmem-mlc-bench -m /opt/mlc/Linux/mlc -t idle -t loaded",
            },
        ];

        let mut help = self.section_title("EXAMPLES", use_colors);
        for example in &examples {
            help.push_str(&example.format(use_colors));
        }
        help
    }
}

impl Default for HelpSystem {
    fn default() -> Self {
        Self::new()
    }
}
