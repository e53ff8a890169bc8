//! Expansion of the configuration into concrete mlc invocations

use crate::defaults::INJECTION_DELAYS;
use crate::error::{AppError, Result};
use crate::mlc::MlcArgs;
use crate::models::Config;
use crate::system::CpuTopology;
use crate::types::{AccessPattern, TestKind, TestMode, TrafficType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Name of the delay list handed to loaded-latency runs
pub const DELAY_FILE_NAME: &str = "injection_delays.txt";

/// One planned mlc run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlcInvocation {
    pub kind: TestKind,
    pub socket: u32,
    /// CPUs generating traffic (the latency CPU for idle runs)
    pub cpus: Vec<u32>,
    pub traffic: Option<TrafficType>,
    pub pattern: Option<AccessPattern>,
    pub buffer_kib: u64,
    pub output_file: PathBuf,
    /// Arguments after the program name
    pub args: Vec<String>,
}

impl MlcInvocation {
    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    /// e.g. `bw_ramp w2/rand 12 CPUs (socket 0)`
    pub fn label(&self) -> String {
        let mut label = self.kind.file_stem().to_string();
        match (self.traffic, self.pattern) {
            (Some(t), Some(p)) => label.push_str(&format!(" {}/{}", t.tag(), p.tag())),
            (None, Some(p)) => label.push_str(&format!(" {}", p.tag())),
            _ => {}
        }
        label.push_str(&format!(
            " {} CPU{} (socket {})",
            self.cpus.len(),
            if self.cpus.len() == 1 { "" } else { "s" },
            self.socket
        ));
        label
    }

    #[cfg(test)]
    pub(crate) fn for_tests(kind: TestKind, file: &str) -> Self {
        Self {
            kind,
            socket: 0,
            cpus: vec![0],
            traffic: None,
            pattern: None,
            buffer_kib: 400_000,
            output_file: PathBuf::from(file),
            args: Vec::new(),
        }
    }
}

/// Ordered list of invocations for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPlan {
    pub output_dir: PathBuf,
    pub sockets: Vec<u32>,
    /// Set when a loaded-latency run needs the delay list
    pub delay_file: Option<PathBuf>,
    pub invocations: Vec<MlcInvocation>,
}

impl TestPlan {
    /// Build the run order: per socket, tests in canonical order; ramp
    /// curves are kept contiguous per traffic type and pattern.
    pub fn build(config: &Config, topology: &CpuTopology) -> Result<Self> {
        let sockets = config.socket.resolve(topology.sockets)?;
        let multi_socket = sockets.len() > 1;
        let delay_file = config
            .runs(TestMode::Loaded)
            .then(|| config.output_dir.join(DELAY_FILE_NAME));

        let mut builder = PlanBuilder {
            config,
            multi_socket,
            delay_file: delay_file.as_deref(),
            invocations: Vec::new(),
        };

        for &socket in &sockets {
            let cores = topology.socket_cores(socket)?;
            for mode in &config.tests {
                match mode {
                    TestMode::Idle => builder.idle(socket, &cores)?,
                    TestMode::Loaded => builder.loaded(socket, &cores)?,
                    TestMode::Ramp => builder.ramp(socket, &cores)?,
                    TestMode::Peak => builder.peak(socket, &cores)?,
                    TestMode::All => return Err(AppError::internal("Unexpanded test mode in plan")),
                }
            }
        }

        let invocations = builder.invocations;
        let mut seen = HashSet::new();
        if let Some(dup) = invocations.iter().find(|inv| !seen.insert(inv.output_file.clone())) {
            return Err(AppError::internal(format!(
                "Two runs would write {}",
                dup.output_file.display()
            )));
        }

        Ok(Self {
            output_dir: config.output_dir.clone(),
            sockets,
            delay_file,
            invocations,
        })
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    /// Contents of the delay file, when one is needed
    pub fn delay_file_contents(&self) -> Option<String> {
        self.delay_file
            .as_ref()
            .map(|_| crate::mlc::delay_file_contents(INJECTION_DELAYS))
    }
}

/// CPU counts visited by a ramp: multiples of `step` below the core count,
/// then the full socket
pub fn ramp_counts(cores: usize, step: usize) -> Vec<usize> {
    let step = step.max(1);
    let mut counts: Vec<usize> = (1..).map(|i| i * step).take_while(|&n| n < cores).collect();
    if cores > 0 {
        counts.push(cores);
    }
    counts
}

/// `<stem>[_<traffic>][_<pattern>]_<N>cpu[_s<socket>].txt`
pub fn result_file_name(
    kind: TestKind,
    traffic: Option<TrafficType>,
    pattern: Option<AccessPattern>,
    cpus: usize,
    socket: Option<u32>,
) -> String {
    let mut name = kind.file_stem().to_string();
    if let Some(t) = traffic {
        name.push('_');
        name.push_str(t.tag());
    }
    if let Some(p) = pattern {
        name.push('_');
        name.push_str(p.tag());
    }
    name.push_str(&format!("_{}cpu", cpus));
    if let Some(s) = socket {
        name.push_str(&format!("_s{}", s));
    }
    name.push_str(".txt");
    name
}

struct PlanBuilder<'a> {
    config: &'a Config,
    multi_socket: bool,
    delay_file: Option<&'a Path>,
    invocations: Vec<MlcInvocation>,
}

impl PlanBuilder<'_> {
    fn base(&self, kind: TestKind) -> MlcArgs {
        MlcArgs::new(kind)
            .duration(self.config.duration_secs)
            .buffer_kib(self.config.buffer_kib)
            .pmem_path(&self.config.pmem_path)
            .avx512(self.config.avx512)
    }

    fn push(
        &mut self,
        args: MlcArgs,
        kind: TestKind,
        socket: u32,
        cpus: Vec<u32>,
        traffic: Option<TrafficType>,
        pattern: Option<AccessPattern>,
    ) -> Result<()> {
        let name = result_file_name(
            kind,
            traffic,
            pattern,
            cpus.len(),
            self.multi_socket.then_some(socket),
        );
        self.invocations.push(MlcInvocation {
            kind,
            socket,
            cpus,
            traffic,
            pattern,
            buffer_kib: self.config.buffer_kib,
            output_file: self.config.output_dir.join(name),
            args: args.build()?,
        });
        Ok(())
    }

    fn idle(&mut self, socket: u32, cores: &[u32]) -> Result<()> {
        let cpu = first_core(cores, socket)?;
        for &pattern in &self.config.patterns {
            let args = self.base(TestKind::IdleLatency).latency_cpu(cpu).pattern(pattern);
            self.push(args, TestKind::IdleLatency, socket, vec![cpu], None, Some(pattern))?;
        }
        Ok(())
    }

    fn loaded(&mut self, socket: u32, cores: &[u32]) -> Result<()> {
        let latency_cpu = first_core(cores, socket)?;
        // A single-core socket has to share the core between both roles
        let load: Vec<u32> = if cores.len() > 1 { cores[1..].to_vec() } else { cores.to_vec() };
        let delay_file = self
            .delay_file
            .ok_or_else(|| AppError::internal("Loaded latency planned without a delay file"))?
            .to_path_buf();

        for &traffic in &self.config.traffic {
            for &pattern in &self.config.patterns {
                let args = self
                    .base(TestKind::LoadedLatency)
                    .delay_file(&delay_file)
                    .latency_cpu(latency_cpu)
                    .load_cpus(&load)
                    .traffic(traffic)
                    .pattern(pattern);
                self.push(args, TestKind::LoadedLatency, socket, load.clone(), Some(traffic), Some(pattern))?;
            }
        }
        Ok(())
    }

    fn ramp(&mut self, socket: u32, cores: &[u32]) -> Result<()> {
        let counts = ramp_counts(cores.len(), self.config.ramp_step as usize);
        for &traffic in &self.config.traffic {
            for &pattern in &self.config.patterns {
                for &n in &counts {
                    let cpus = cores[..n].to_vec();
                    let args = self
                        .base(TestKind::BandwidthRamp)
                        .load_cpus(&cpus)
                        .traffic(traffic)
                        .pattern(pattern);
                    self.push(args, TestKind::BandwidthRamp, socket, cpus, Some(traffic), Some(pattern))?;
                }
            }
        }
        Ok(())
    }

    fn peak(&mut self, socket: u32, cores: &[u32]) -> Result<()> {
        first_core(cores, socket)?;
        let args = self.base(TestKind::PeakBandwidth).load_cpus(cores);
        self.push(args, TestKind::PeakBandwidth, socket, cores.to_vec(), None, None)
    }
}

fn first_core(cores: &[u32], socket: u32) -> Result<u32> {
    cores
        .first()
        .copied()
        .ok_or_else(|| AppError::precondition(format!("Socket {} has no usable cores", socket)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::NumaNode;
    use crate::types::SocketSelection;

    fn topology(sockets: u32, cores: u32) -> CpuTopology {
        CpuTopology {
            model_name: "Test CPU".to_string(),
            sockets,
            cores_per_socket: cores,
            threads_per_core: 2,
            numa_nodes: (0..sockets)
                .map(|s| NumaNode {
                    id: s,
                    cpus: (s * cores..(s + 1) * cores)
                        .chain(sockets * cores + s * cores..sockets * cores + (s + 1) * cores)
                        .collect(),
                })
                .collect(),
            flags: vec!["avx512f".to_string()],
        }
    }

    fn config(tests: &[TestMode]) -> Config {
        Config {
            output_dir: PathBuf::from("/tmp/run"),
            tests: tests.to_vec(),
            ..Default::default()
        }
    }

    fn names(plan: &TestPlan) -> Vec<String> {
        plan.invocations
            .iter()
            .map(|i| i.output_file.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_ramp_counts() {
        assert_eq!(ramp_counts(4, 1), vec![1, 2, 3, 4]);
        assert_eq!(ramp_counts(28, 8), vec![8, 16, 24, 28]);
        assert_eq!(ramp_counts(8, 4), vec![4, 8]);
        assert_eq!(ramp_counts(3, 10), vec![3]);
        assert_eq!(ramp_counts(0, 1), Vec::<usize>::new());
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            result_file_name(TestKind::IdleLatency, None, Some(AccessPattern::Sequential), 1, None),
            "idle_latency_seq_1cpu.txt"
        );
        assert_eq!(
            result_file_name(TestKind::BandwidthRamp, Some(TrafficType::W2), Some(AccessPattern::Random), 12, None),
            "bw_ramp_w2_rand_12cpu.txt"
        );
        assert_eq!(
            result_file_name(TestKind::PeakBandwidth, None, None, 28, Some(1)),
            "peak_bandwidth_28cpu_s1.txt"
        );
    }

    #[test]
    fn test_idle_and_peak_plan() {
        let plan = TestPlan::build(&config(&[TestMode::Idle, TestMode::Peak]), &topology(1, 4)).unwrap();
        assert_eq!(
            names(&plan),
            ["idle_latency_seq_1cpu.txt", "idle_latency_rand_1cpu.txt", "peak_bandwidth_4cpu.txt"]
        );
        assert!(plan.delay_file.is_none());
        assert!(plan.delay_file_contents().is_none());
        assert_eq!(plan.invocations[2].args[2], "-k0-3");
    }

    #[test]
    fn test_loaded_plan_splits_latency_and_load() {
        let mut cfg = config(&[TestMode::Loaded]);
        cfg.traffic = vec![TrafficType::R];
        cfg.patterns = vec![AccessPattern::Sequential];
        let plan = TestPlan::build(&cfg, &topology(1, 28)).unwrap();

        assert_eq!(names(&plan), ["loaded_latency_r_seq_27cpu.txt"]);
        assert_eq!(plan.delay_file, Some(PathBuf::from("/tmp/run/injection_delays.txt")));
        let args = &plan.invocations[0].args;
        assert!(args.contains(&"-c0".to_string()));
        assert!(args.contains(&"-k1-27".to_string()));
        assert!(args.contains(&"-D/tmp/run/injection_delays.txt".to_string()));

        let contents = plan.delay_file_contents().unwrap();
        assert_eq!(contents.lines().count(), INJECTION_DELAYS.len());
        assert!(contents.starts_with("0\n2\n8\n"));
    }

    #[test]
    fn test_single_core_loaded_shares_cpu() {
        let plan = TestPlan::build(&config(&[TestMode::Loaded]), &topology(1, 1)).unwrap();
        let first = &plan.invocations[0];
        assert_eq!(first.cpus, vec![0]);
        assert!(first.args.contains(&"-c0".to_string()));
        assert!(first.args.contains(&"-k0".to_string()));
    }

    #[test]
    fn test_ramp_plan_covers_every_combination() {
        let mut cfg = config(&[TestMode::Ramp]);
        cfg.ramp_step = 2;
        let plan = TestPlan::build(&cfg, &topology(1, 5)).unwrap();

        // 4 traffic types x 2 patterns x {2, 4, 5} CPUs
        assert_eq!(plan.len(), 24);
        let names = names(&plan);
        assert_eq!(&names[..3], ["bw_ramp_r_seq_2cpu.txt", "bw_ramp_r_seq_4cpu.txt", "bw_ramp_r_seq_5cpu.txt"]);
        assert!(names.contains(&"bw_ramp_w6_rand_5cpu.txt".to_string()));
    }

    #[test]
    fn test_multi_socket_names_are_unique() {
        let mut cfg = config(&[TestMode::Idle, TestMode::Loaded, TestMode::Ramp, TestMode::Peak]);
        cfg.socket = SocketSelection::All;
        let plan = TestPlan::build(&cfg, &topology(2, 4)).unwrap();

        assert_eq!(plan.sockets, vec![0, 1]);
        let names = names(&plan);
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(names.iter().all(|n| n.ends_with("_s0.txt") || n.ends_with("_s1.txt")));

        let socket1_peak = plan
            .invocations
            .iter()
            .find(|i| i.kind == TestKind::PeakBandwidth && i.socket == 1)
            .unwrap();
        assert_eq!(socket1_peak.cpus, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_missing_socket_rejected() {
        let mut cfg = config(&[TestMode::Idle]);
        cfg.socket = SocketSelection::Single(3);
        let err = TestPlan::build(&cfg, &topology(2, 4)).unwrap_err();
        assert!(err.to_string().contains("Socket 3 does not exist"));
    }

    #[test]
    fn test_avx512_only_on_bandwidth_runs() {
        let mut cfg = config(&[TestMode::Idle, TestMode::Peak]);
        cfg.avx512 = true;
        let plan = TestPlan::build(&cfg, &topology(1, 2)).unwrap();
        for inv in &plan.invocations {
            let has_z = inv.args.contains(&"-Z".to_string());
            assert_eq!(has_z, inv.kind == TestKind::PeakBandwidth, "{}", inv.label());
        }
    }
}
