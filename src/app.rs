//! Main application orchestration and execution

use crate::{
    config::{display_config_summary, ConfigValidator, ValidationWarning},
    diagnostics::SystemSnapshot,
    error::{ErrorContext, Result},
    executor::{TestExecutor, TestPlan},
    log_debug, log_info,
    logging::LoggerFactory,
    models::{Config, ExecutionResults},
    output::{OutputCoordinator, OutputFormatterFactory},
    system::{CommandRunner, CpuTopology, PreflightChecker, ResolvedTools, SystemRunner},
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

const LSCPU_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates one benchmark run from configuration to summary
pub struct App {
    config: Config,
    runner: Box<dyn CommandRunner>,
    loggers: LoggerFactory,
    search_path: Option<OsString>,
    proc_files: Option<(PathBuf, PathBuf)>,
}

impl App {
    /// Create an application that runs real processes
    pub fn new(config: Config) -> Self {
        Self::with_runner(config, Box::new(SystemRunner::new()))
    }

    pub fn with_runner(config: Config, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            loggers: LoggerFactory::new(config.clone()),
            config,
            runner,
            search_path: std::env::var_os("PATH"),
            proc_files: None,
        }
    }

    /// Look tools up in `search_path` instead of `$PATH`
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Read mounts and process status from other files than `/proc`
    pub fn with_proc_files(mut self, mounts: impl Into<PathBuf>, status: impl Into<PathBuf>) -> Self {
        self.proc_files = Some((mounts.into(), status.into()));
        self
    }

    /// Run the application. Partial results are printed even when the run
    /// stops early.
    pub async fn run(&self) -> Result<ExecutionResults> {
        let logger = self.loggers.create_logger("APP").await;
        let config = &self.config;

        let warnings = ConfigValidator::validate_comprehensive(config)?;
        self.print_warnings(&warnings);

        if config.debug {
            eprintln!("Configuration Summary:\n{}\n", display_config_summary(config));
        }

        let tools = ResolvedTools::resolve_with_search_path(config, self.search_path.clone())?;
        log_debug!(logger, "Using mlc at {}", tools.mlc.display());

        let topology = self.discover_topology(&tools).await?;
        log_info!(
            logger,
            "{}: {} socket(s), {} cores per socket, {} thread(s) per core",
            topology.model_name,
            topology.sockets,
            topology.cores_per_socket,
            topology.threads_per_core
        );
        self.print_warnings(&ConfigValidator::validate_against_topology(config, &topology));

        let mut checker = PreflightChecker::new(self.runner.as_ref(), &tools, config);
        if let Some((mounts, status)) = &self.proc_files {
            checker = checker.with_proc_files(mounts.clone(), status.clone());
        }
        let report = checker.run(config.dry_run).await?;
        if report.skipped {
            log_info!(logger, "Dry run: skipping privilege, mount, DIMM and scrub checks");
        } else {
            log_info!(
                logger,
                "Preflight passed: {} DIMM(s) healthy, {} bus(es) scrubbed",
                report.dimms.len(),
                report.buses.len()
            );
        }

        let plan = TestPlan::build(config, &topology)?;
        log_info!(logger, "Planned {} mlc run(s) into {}", plan.len(), plan.output_dir.display());

        SystemSnapshot::new(self.runner.as_ref(), &tools, &logger).capture(config).await;

        let executor = TestExecutor::new(
            self.runner.as_ref(),
            tools.mlc.clone(),
            config,
            self.loggers.create_bench_logger().await,
        );
        let outcome = executor.execute(&plan).await;

        if config.dry_run {
            println!("\n{} mlc run(s) planned; nothing was executed.", plan.len());
        } else {
            self.report(&outcome.results, &plan);
        }

        outcome.into_result()
    }

    async fn discover_topology(&self, tools: &ResolvedTools) -> Result<CpuTopology> {
        let output = self.runner.run(&tools.lscpu, &[], LSCPU_TIMEOUT).await?;
        output.ensure_success("lscpu")?;
        CpuTopology::from_lscpu(&output.stdout).with_context(|| "Unexpected lscpu output".to_string())
    }

    fn report(&self, results: &ExecutionResults, plan: &TestPlan) {
        let coordinator = OutputCoordinator::new(OutputFormatterFactory::create_formatter(
            self.config.enable_color,
            self.config.verbose,
        ))
        .with_run_log(self.config.verbose);

        match coordinator.display_results(results) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("{}", e.format_for_console(self.config.enable_color)),
        }

        if results.records.is_empty() {
            return;
        }
        match coordinator.write_summary_file(results, &plan.output_dir) {
            Ok(path) => {
                if let Ok(line) = coordinator.display_success(&format!("Summary written to {}", path.display())) {
                    println!("\n{}", line);
                }
            }
            Err(e) => {
                if let Ok(line) = coordinator.display_warning(&e.to_string()) {
                    eprintln!("{}", line);
                }
            }
        }
    }

    fn print_warnings(&self, warnings: &[ValidationWarning]) {
        for warning in warnings {
            eprintln!("{}", warning.format(self.config.enable_color));
        }
    }

    pub fn session_id(&self) -> &str {
        self.loggers.session_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testing::FakeRunner;
    use crate::types::{AccessPattern, TestMode, TrafficType};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const LSCPU: &str = "Model name:            Test CPU\n\
Socket(s):             1\n\
Core(s) per socket:    4\n\
Thread(s) per core:    1\n\
NUMA node(s):          1\n\
NUMA node0 CPU(s):     0-3\n\
Flags:                 fpu avx512f\n";

    fn tool_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        for tool in ["mlc", "ipmctl", "ndctl", "numactl", "lscpu"] {
            let path = dir.path().join(tool);
            std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    }

    fn config(out: &TempDir) -> Config {
        Config {
            output_dir: out.path().join("run"),
            tests: vec![TestMode::Idle, TestMode::Peak],
            traffic: vec![TrafficType::R],
            patterns: vec![AccessPattern::Sequential],
            dry_run: true,
            enable_color: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_running_mlc() {
        let tools = tool_dir();
        let out = TempDir::new().unwrap();
        let app = App::with_runner(config(&out), Box::new(FakeRunner::new().reply(LSCPU)))
            .with_search_path(Some(tools.path().as_os_str().to_owned()));

        let results = app.run().await.unwrap();

        assert_eq!(results.summary.total_planned, 2);
        assert_eq!(results.summary.skipped, 2);
        assert!(!out.path().join("run").exists());
    }

    #[tokio::test]
    async fn test_missing_tools_are_reported_before_anything_runs() {
        let empty = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let app = App::with_runner(config(&out), Box::new(FakeRunner::new()))
            .with_search_path(Some(empty.path().as_os_str().to_owned()));

        let err = app.run().await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("mlc"));
        assert!(err.to_string().contains("lscpu"));
    }

    #[tokio::test]
    async fn test_bad_lscpu_output_is_a_parse_error() {
        let tools = tool_dir();
        let out = TempDir::new().unwrap();
        let app = App::with_runner(config(&out), Box::new(FakeRunner::new().reply("Architecture: x86_64\n")))
            .with_search_path(Some(tools.path().as_os_str().to_owned()));

        let err = app.run().await.unwrap_err();
        assert!(err.to_string().contains("Unexpected lscpu output"));
    }

    #[tokio::test]
    async fn test_preflight_failure_stops_before_plan() {
        let tools = tool_dir();
        let out = TempDir::new().unwrap();
        let proc = TempDir::new().unwrap();
        std::fs::write(proc.path().join("status"), "Name:\tbench\nUid:\t1000\t1000\t1000\t1000\n").unwrap();
        std::fs::write(proc.path().join("mounts"), "").unwrap();

        let mut cfg = config(&out);
        cfg.dry_run = false;
        let runner = FakeRunner::new().reply(LSCPU);
        let app = App::with_runner(cfg, Box::new(runner))
            .with_search_path(Some(tools.path().as_os_str().to_owned()))
            .with_proc_files(proc.path().join("mounts"), proc.path().join("status"));

        let err = app.run().await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(!out.path().join("run").exists());
    }
}
