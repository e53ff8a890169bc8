//! Sequential execution of a test plan
//!
//! Exactly one mlc process runs at a time. Its stdout is stored verbatim
//! in the invocation's result file before the figures are scraped, so a
//! failed scrape still leaves the raw output behind for inspection.

pub mod plan;

pub use plan::{MlcInvocation, TestPlan};

use crate::error::{AppError, ErrorContext, Result};
use crate::logging::BenchLogger;
use crate::mlc::{self, parse_measurement, parse_version};
use crate::models::{Config, ExecutionResults, ExecutionSummary, TestRecord};
use crate::system::CommandRunner;
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Results gathered so far plus the error that stopped the run, if any
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub results: ExecutionResults,
    pub error: Option<AppError>,
}

impl ExecutionOutcome {
    pub fn into_result(self) -> Result<ExecutionResults> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }
}

/// Runs planned invocations one after another
pub struct TestExecutor<'a> {
    runner: &'a dyn CommandRunner,
    mlc: PathBuf,
    timeout: Duration,
    dry_run: bool,
    logger: BenchLogger,
}

impl<'a> TestExecutor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, mlc: PathBuf, config: &Config, logger: BenchLogger) -> Self {
        Self {
            runner,
            mlc,
            timeout: config.timeout(),
            dry_run: config.dry_run,
            logger,
        }
    }

    /// Execute the plan, stopping early on Ctrl-C
    pub async fn execute(&self, plan: &TestPlan) -> ExecutionOutcome {
        self.execute_until(plan, async {
            // If the handler cannot be installed, never report an interrupt
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Execute the plan until `interrupt` resolves. The running mlc child is
    /// dropped (and therefore killed) when that happens.
    pub async fn execute_until<F>(&self, plan: &TestPlan, interrupt: F) -> ExecutionOutcome
    where
        F: Future<Output = ()>,
    {
        let started_at = Utc::now();
        let clock = Instant::now();

        if self.dry_run {
            return self.dry_run_outcome(plan, started_at);
        }

        let mut records = Vec::with_capacity(plan.len());
        let mut mlc_version = None;
        let mut interrupted = false;

        let error = match self.prepare_output(plan).await {
            Err(e) => Some(e),
            Ok(()) => {
                tokio::pin!(interrupt);
                let mut failure = None;

                for (index, invocation) in plan.invocations.iter().enumerate() {
                    let command = mlc::command_line(&self.mlc, &invocation.args);
                    self.logger.log_invocation_start(index, plan.len(), &command).await;

                    let started = Instant::now();
                    let step = tokio::select! {
                        result = self.run_one(invocation) => Some(result),
                        _ = &mut interrupt => None,
                    };

                    let Some(result) = step else {
                        interrupted = true;
                        records.push(TestRecord::skipped(invocation.clone(), "interrupted".to_string()));
                        failure = Some(AppError::interrupted(format!(
                            "stopped during {} after {} of {} runs",
                            invocation.label(),
                            index,
                            plan.len()
                        )));
                        break;
                    };

                    let elapsed = started.elapsed();
                    match result {
                        Ok((record, version)) => {
                            if mlc_version.is_none() {
                                mlc_version = version;
                            }
                            self.logger.log_record(&record).await;
                            records.push(record);
                        }
                        Err(error) => {
                            let record = match error {
                                AppError::Timeout(_) => TestRecord::timeout(invocation.clone(), elapsed),
                                _ => TestRecord::failed(invocation.clone(), elapsed, error.to_string()),
                            };
                            self.logger.log_record(&record).await;
                            self.logger.log_error(&error, &invocation.label(), elapsed).await;
                            records.push(record);
                            failure = Some(error);
                            break;
                        }
                    }
                }
                failure
            }
        };

        let mut summary = ExecutionSummary::from_records(&records, plan.len(), clock.elapsed());
        summary.mlc_version = mlc_version;
        summary.interrupted = interrupted;
        self.logger.log_run_summary(&summary).await;

        ExecutionOutcome {
            results: ExecutionResults::new(summary, records, started_at),
            error,
        }
    }

    fn dry_run_outcome(&self, plan: &TestPlan, started_at: chrono::DateTime<Utc>) -> ExecutionOutcome {
        if let Some(delay_file) = &plan.delay_file {
            println!("# would write {}", delay_file.display());
        }
        let records: Vec<TestRecord> = plan
            .invocations
            .iter()
            .map(|invocation| {
                println!("{} > {}", mlc::command_line(&self.mlc, &invocation.args), invocation.output_file.display());
                TestRecord::skipped(invocation.clone(), "dry run".to_string())
            })
            .collect();

        let summary = ExecutionSummary::from_records(&records, plan.len(), Duration::ZERO);
        ExecutionOutcome {
            results: ExecutionResults::new(summary, records, started_at),
            error: None,
        }
    }

    /// Create the output directory and delay file, and refuse to start if
    /// any result file already exists
    async fn prepare_output(&self, plan: &TestPlan) -> Result<()> {
        tokio::fs::create_dir_all(&plan.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", plan.output_dir.display()))?;

        if let Some(existing) = plan.invocations.iter().find(|i| i.output_file.exists()) {
            return Err(AppError::io(format!(
                "Result file {} already exists; choose another --output-dir",
                existing.output_file.display()
            )));
        }

        if let (Some(path), Some(contents)) = (&plan.delay_file, plan.delay_file_contents()) {
            match tokio::fs::read_to_string(path).await {
                Ok(existing) if existing == contents => {}
                Ok(_) => {
                    return Err(AppError::io(format!(
                        "{} exists with different delays; refusing to overwrite",
                        path.display()
                    )))
                }
                Err(_) => write_new_file(path, &contents).await?,
            }
        }

        Ok(())
    }

    async fn run_one(&self, invocation: &MlcInvocation) -> Result<(TestRecord, Option<String>)> {
        let started = Instant::now();
        let output = self.runner.run(&self.mlc, &invocation.args, self.timeout).await?;
        let elapsed = started.elapsed();

        write_new_file(&invocation.output_file, &output.stdout).await?;
        output.ensure_success(&format!("mlc ({})", invocation.label()))?;

        let measurement = parse_measurement(invocation.kind, &output.stdout)
            .with_context(|| format!("{}", invocation.output_file.display()))?;

        Ok((
            TestRecord::success(invocation.clone(), measurement, elapsed),
            parse_version(&output.stdout),
        ))
    }
}

/// Write a file that must not exist yet
async fn write_new_file(path: &Path, contents: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .with_context(|| format!("Cannot create {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlc::parse::samples;
    use crate::system::testing::FakeRunner;
    use crate::system::{CommandOutput, CpuTopology, NumaNode};
    use crate::types::{AccessPattern, TestMode, TestStatus, TrafficType};
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn topology(cores: u32) -> CpuTopology {
        CpuTopology {
            model_name: "Test CPU".to_string(),
            sockets: 1,
            cores_per_socket: cores,
            threads_per_core: 1,
            numa_nodes: vec![NumaNode { id: 0, cpus: (0..cores).collect() }],
            flags: Vec::new(),
        }
    }

    fn config(dir: &TempDir, tests: &[TestMode]) -> Config {
        Config {
            output_dir: dir.path().join("run"),
            tests: tests.to_vec(),
            traffic: vec![TrafficType::R],
            patterns: vec![AccessPattern::Sequential],
            ..Default::default()
        }
    }

    fn executor<'a>(runner: &'a dyn CommandRunner, config: &Config) -> TestExecutor<'a> {
        let mut quiet = config.clone();
        quiet.enable_color = false;
        TestExecutor::new(runner, PathBuf::from("/usr/local/bin/mlc"), config, BenchLogger::new(&quiet))
    }

    #[tokio::test]
    async fn test_successful_run_writes_raw_output() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[TestMode::Idle, TestMode::Loaded, TestMode::Peak]);
        let plan = TestPlan::build(&config, &topology(4)).unwrap();
        let runner = FakeRunner::new().reply(samples::IDLE).reply(samples::LOADED).reply(samples::PEAK);

        let outcome = executor(&runner, &config).execute_until(&plan, std::future::pending()).await;
        let results = outcome.into_result().unwrap();

        assert_eq!(results.summary.successful, 3);
        assert!(results.summary.is_complete());
        assert_eq!(results.summary.mlc_version.as_deref(), Some("v3.9a"));

        let idle_file = config.output_dir.join("idle_latency_seq_1cpu.txt");
        assert_eq!(std::fs::read_to_string(idle_file).unwrap(), samples::IDLE);
        let delays = std::fs::read_to_string(config.output_dir.join("injection_delays.txt")).unwrap();
        assert!(delays.ends_with("20000\n"));

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0, PathBuf::from("/usr/local/bin/mlc"));
        assert_eq!(calls[2].1[0], "--peak_injection_bandwidth");
    }

    #[tokio::test]
    async fn test_failure_stops_run_and_keeps_partial_results() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[TestMode::Idle, TestMode::Peak]);
        let plan = TestPlan::build(&config, &topology(4)).unwrap();
        let runner = FakeRunner::new().reply(samples::IDLE).reply_with(Ok(CommandOutput {
            status_code: Some(1),
            stdout: "partial output\n".to_string(),
            stderr: "Failed to allocate memory\n".to_string(),
        }));

        let outcome = executor(&runner, &config).execute_until(&plan, std::future::pending()).await;
        let error = outcome.error.as_ref().unwrap();
        assert_eq!(error.exit_code(), 4);
        assert!(error.to_string().contains("Failed to allocate memory"));

        let summary = &outcome.results.summary;
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            std::fs::read_to_string(config.output_dir.join("peak_bandwidth_4cpu.txt")).unwrap(),
            "partial output\n"
        );
    }

    #[tokio::test]
    async fn test_unparseable_output_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[TestMode::Idle]);
        let plan = TestPlan::build(&config, &topology(2)).unwrap();
        let runner = FakeRunner::new().reply("garbage\n");

        let outcome = executor(&runner, &config).execute_until(&plan, std::future::pending()).await;
        assert_eq!(outcome.error.unwrap().category(), "PARSE");
        assert_eq!(outcome.results.records[0].status, TestStatus::Failed);
    }

    #[tokio::test]
    async fn test_timeout_recorded() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[TestMode::Peak]);
        let plan = TestPlan::build(&config, &topology(2)).unwrap();
        let runner = FakeRunner::new().reply_with(Err(AppError::timeout("mlc did not finish within 900s")));

        let outcome = executor(&runner, &config).execute_until(&plan, std::future::pending()).await;
        assert_eq!(outcome.results.summary.timed_out, 1);
        assert_eq!(outcome.error.unwrap().category(), "TIMEOUT");
    }

    #[tokio::test]
    async fn test_existing_result_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[TestMode::Peak]);
        let plan = TestPlan::build(&config, &topology(2)).unwrap();
        std::fs::create_dir_all(&config.output_dir).unwrap();
        std::fs::write(config.output_dir.join("peak_bandwidth_2cpu.txt"), "old").unwrap();
        let runner = FakeRunner::new();

        let outcome = executor(&runner, &config).execute_until(&plan, std::future::pending()).await;
        assert_eq!(outcome.error.unwrap().category(), "IO");
        assert_eq!(runner.call_count(), 0);
        assert_eq!(std::fs::read_to_string(config.output_dir.join("peak_bandwidth_2cpu.txt")).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &[TestMode::Idle, TestMode::Loaded]);
        config.dry_run = true;
        let plan = TestPlan::build(&config, &topology(2)).unwrap();
        let runner = FakeRunner::new();

        let outcome = executor(&runner, &config).execute_until(&plan, std::future::pending()).await;
        let results = outcome.into_result().unwrap();
        assert_eq!(results.summary.skipped, 2);
        assert_eq!(runner.call_count(), 0);
        assert!(!config.output_dir.exists());
    }

    struct SlowRunner;

    #[async_trait]
    impl CommandRunner for SlowRunner {
        async fn run(&self, _program: &Path, _args: &[String], _timeout: Duration) -> Result<CommandOutput> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(AppError::internal("should have been interrupted"))
        }
    }

    #[tokio::test]
    async fn test_interrupt_stops_current_run() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[TestMode::Idle, TestMode::Peak]);
        let plan = TestPlan::build(&config, &topology(2)).unwrap();

        let outcome = executor(&SlowRunner, &config)
            .execute_until(&plan, tokio::time::sleep(Duration::from_millis(50)))
            .await;

        let error = outcome.error.unwrap();
        assert_eq!(error.exit_code(), 130);
        let summary = &outcome.results.summary;
        assert!(summary.interrupted);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.successful, 0);
    }
}
