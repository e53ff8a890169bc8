//! Intel Memory Latency Checker invocation and output handling

pub mod parse;

pub use parse::{parse_measurement, parse_version};

use crate::error::{AppError, Result};
use crate::system::format_cpu_list;
use crate::types::{AccessPattern, TestKind, TrafficType};
use std::path::{Path, PathBuf};

/// Builder for one mlc argument vector.
///
/// Which fields are required depends on the test kind; `build` rejects a
/// combination mlc would not accept instead of letting mlc fail later.
#[derive(Debug, Clone, PartialEq)]
pub struct MlcArgs {
    kind: TestKind,
    duration_secs: Option<u32>,
    buffer_kib: Option<u64>,
    pmem_path: Option<PathBuf>,
    latency_cpu: Option<u32>,
    load_cpus: Vec<u32>,
    traffic: Option<TrafficType>,
    pattern: AccessPattern,
    delay_file: Option<PathBuf>,
    avx512: bool,
}

impl MlcArgs {
    pub fn new(kind: TestKind) -> Self {
        Self {
            kind,
            duration_secs: None,
            buffer_kib: None,
            pmem_path: None,
            latency_cpu: None,
            load_cpus: Vec::new(),
            traffic: None,
            pattern: AccessPattern::Sequential,
            delay_file: None,
            avx512: false,
        }
    }

    pub fn duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn buffer_kib(mut self, kib: u64) -> Self {
        self.buffer_kib = Some(kib);
        self
    }

    /// Directory on the DAX file system where mlc places its buffers
    pub fn pmem_path(mut self, path: &Path) -> Self {
        self.pmem_path = Some(path.to_path_buf());
        self
    }

    pub fn latency_cpu(mut self, cpu: u32) -> Self {
        self.latency_cpu = Some(cpu);
        self
    }

    pub fn load_cpus(mut self, cpus: &[u32]) -> Self {
        self.load_cpus = cpus.to_vec();
        self
    }

    pub fn traffic(mut self, traffic: TrafficType) -> Self {
        self.traffic = Some(traffic);
        self
    }

    pub fn pattern(mut self, pattern: AccessPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn delay_file(mut self, path: &Path) -> Self {
        self.delay_file = Some(path.to_path_buf());
        self
    }

    pub fn avx512(mut self, enabled: bool) -> Self {
        self.avx512 = enabled;
        self
    }

    fn require<T: Clone>(&self, value: &Option<T>, what: &str) -> Result<T> {
        value
            .clone()
            .ok_or_else(|| AppError::internal(format!("{} run is missing its {}", self.kind.title(), what)))
    }

    fn require_load(&self) -> Result<String> {
        if self.load_cpus.is_empty() {
            return Err(AppError::internal(format!("{} run has no load CPUs", self.kind.title())));
        }
        Ok(format!("-k{}", format_cpu_list(&self.load_cpus)))
    }

    /// Produce the argument vector (without the program name)
    pub fn build(&self) -> Result<Vec<String>> {
        let pmem = format!("-J{}", self.require(&self.pmem_path, "PMem path")?.display());
        let buffer = format!("-b{}", self.require(&self.buffer_kib, "buffer size")?);
        let random = self.pattern == AccessPattern::Random;
        let mut args = Vec::new();

        match self.kind {
            TestKind::IdleLatency => {
                args.push("--idle_latency".to_string());
                args.push(format!("-c{}", self.require(&self.latency_cpu, "latency CPU")?));
                // Smaller buffers measure cache hits, not PMem
                args.push(buffer);
                args.push(pmem);
                if random {
                    args.push("-r".to_string());
                }
            }
            TestKind::LoadedLatency => {
                args.push("--loaded_latency".to_string());
                args.push(format!("-D{}", self.require(&self.delay_file, "delay file")?.display()));
                args.push(format!("-t{}", self.require(&self.duration_secs, "duration")?));
                args.push(format!("-c{}", self.require(&self.latency_cpu, "latency CPU")?));
                args.push(self.require_load()?);
                args.push(buffer);
                args.push(pmem);
                args.push(self.require(&self.traffic, "traffic type")?.mlc_flag().to_string());
                if random {
                    args.push("-r".to_string());
                }
                if self.avx512 {
                    args.push("-Z".to_string());
                }
            }
            TestKind::BandwidthRamp => {
                // -d0 with -T: no latency thread, bandwidth only
                args.push("--loaded_latency".to_string());
                args.push("-d0".to_string());
                args.push("-T".to_string());
                args.push(format!("-t{}", self.require(&self.duration_secs, "duration")?));
                args.push(self.require_load()?);
                args.push(buffer);
                args.push(pmem);
                args.push(self.require(&self.traffic, "traffic type")?.mlc_flag().to_string());
                if random {
                    args.push("-r".to_string());
                }
                if self.avx512 {
                    args.push("-Z".to_string());
                }
            }
            TestKind::PeakBandwidth => {
                args.push("--peak_injection_bandwidth".to_string());
                args.push(format!("-t{}", self.require(&self.duration_secs, "duration")?));
                args.push(self.require_load()?);
                args.push(buffer);
                args.push(pmem);
                if self.avx512 {
                    args.push("-Z".to_string());
                }
            }
        }

        Ok(args)
    }
}

/// Render a command line for display; arguments with whitespace are quoted
pub fn command_line(program: &Path, args: &[String]) -> String {
    std::iter::once(program.display().to_string())
        .chain(args.iter().map(|a| {
            if a.contains(char::is_whitespace) {
                format!("'{}'", a)
            } else {
                a.clone()
            }
        }))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Contents of the `-D` delay file: one injection delay per line
pub fn delay_file_contents(delays: &[u32]) -> String {
    let mut out = String::new();
    for delay in delays {
        out.push_str(&delay.to_string());
        out.push('\n');
    }
    out
}
