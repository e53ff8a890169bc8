//! System inventory snapshot stored next to the benchmark results
//!
//! The snapshot records what the machine looked like when the numbers were
//! taken. Nothing here is allowed to stop a run: each failed capture is
//! logged as a warning and the rest carry on.

use crate::{
    config::display_config_summary,
    error::{AppError, Result},
    logging::Logger,
    log_warn,
    models::Config,
    system::{CommandRunner, ResolvedTools},
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Directory under the output directory holding the snapshot
pub const SYSINFO_DIR: &str = "sysinfo";

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(60);

/// One inventory command and the file its output goes to
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotCommand {
    pub file_name: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// What a snapshot managed to capture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotReport {
    pub written: Vec<PathBuf>,
    /// `(file name, reason)` for every capture that failed
    pub failed: Vec<(String, String)>,
}

impl SnapshotReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Captures tool output and host details into `<output>/sysinfo/`
pub struct SystemSnapshot<'a> {
    runner: &'a dyn CommandRunner,
    tools: &'a ResolvedTools,
    logger: &'a Logger,
}

impl<'a> SystemSnapshot<'a> {
    pub fn new(runner: &'a dyn CommandRunner, tools: &'a ResolvedTools, logger: &'a Logger) -> Self {
        Self { runner, tools, logger }
    }

    pub fn commands(&self) -> Vec<SnapshotCommand> {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        vec![
            SnapshotCommand {
                file_name: "lscpu.txt",
                program: self.tools.lscpu.clone(),
                args: Vec::new(),
            },
            SnapshotCommand {
                file_name: "numactl.txt",
                program: self.tools.numactl.clone(),
                args: args(&["-H"]),
            },
            SnapshotCommand {
                file_name: "ipmctl_topology.txt",
                program: self.tools.ipmctl.clone(),
                args: args(&["show", "-topology"]),
            },
            SnapshotCommand {
                file_name: "ndctl.txt",
                program: self.tools.ndctl.clone(),
                args: args(&["list", "--buses", "--dimms", "--regions", "--namespaces"]),
            },
        ]
    }

    /// Capture everything. A dry run captures nothing.
    pub async fn capture(&self, config: &Config) -> SnapshotReport {
        let mut report = SnapshotReport::default();
        if config.dry_run {
            return report;
        }

        let dir = config.output_dir.join(SYSINFO_DIR);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            let reason = format!("Cannot create {}: {}", dir.display(), e);
            log_warn!(self.logger, "System snapshot skipped: {}", reason);
            report.failed.push((SYSINFO_DIR.to_string(), reason));
            return report;
        }

        for command in self.commands() {
            let outcome = match self.run_command(&command).await {
                Ok(text) => write_new(&dir.join(command.file_name), &text).await,
                Err(e) => Err(e),
            };
            self.settle(&mut report, &dir, command.file_name, outcome).await;
        }

        let host = write_new(&dir.join("host.txt"), &host_summary(config)).await;
        self.settle(&mut report, &dir, "host.txt", host).await;

        report
    }

    async fn run_command(&self, command: &SnapshotCommand) -> Result<String> {
        let output = self.runner.run(&command.program, &command.args, SNAPSHOT_TIMEOUT).await?;
        output.ensure_success(&command.program.display().to_string())?;
        Ok(output.stdout)
    }

    async fn settle(&self, report: &mut SnapshotReport, dir: &Path, file_name: &str, outcome: Result<()>) {
        match outcome {
            Ok(()) => report.written.push(dir.join(file_name)),
            Err(e) => {
                log_warn!(self.logger, "Could not capture {}: {}", file_name, e);
                report.failed.push((file_name.to_string(), e.to_string()));
            }
        }
    }
}

/// Host and run details that no inventory tool reports
pub fn host_summary(config: &Config) -> String {
    let mut lines = vec![
        format!("Captured: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
        format!("{} v{}", crate::PKG_NAME, crate::VERSION),
        format!("Logical CPUs: {}", num_cpus::get()),
        format!("Physical cores: {}", num_cpus::get_physical()),
        String::new(),
    ];
    lines.push(display_config_summary(config));
    lines.push(String::new());
    lines.join("\n")
}

async fn write_new(path: &Path, contents: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| AppError::io(format!("Cannot create {}: {}", path.display(), e)))?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testing::FakeRunner;
    use crate::system::CommandOutput;
    use tempfile::TempDir;

    fn tools() -> ResolvedTools {
        ResolvedTools {
            mlc: PathBuf::from("/opt/mlc"),
            ipmctl: PathBuf::from("/usr/bin/ipmctl"),
            ndctl: PathBuf::from("/usr/bin/ndctl"),
            numactl: PathBuf::from("/usr/bin/numactl"),
            lscpu: PathBuf::from("/usr/bin/lscpu"),
        }
    }

    fn config(dir: &Path) -> Config {
        Config {
            output_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_capture_writes_every_snapshot() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new().reply("Socket(s): 2\n").reply("available: 2 nodes\n").reply("DimmID\n").reply("[]\n");
        let tools = tools();
        let logger = Logger::with_config("TEST".to_string(), &Config::default());

        let report = SystemSnapshot::new(&runner, &tools, &logger).capture(&config(dir.path())).await;

        assert!(report.is_complete());
        assert_eq!(report.written.len(), 5);
        let sysinfo = dir.path().join(SYSINFO_DIR);
        assert_eq!(std::fs::read_to_string(sysinfo.join("lscpu.txt")).unwrap(), "Socket(s): 2\n");
        assert!(std::fs::read_to_string(sysinfo.join("host.txt")).unwrap().contains("Logical CPUs:"));

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[1].1, vec!["-H".to_string()]);
        assert_eq!(calls[3].1[0], "list");
    }

    #[tokio::test]
    async fn test_failures_are_not_fatal() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new()
            .reply("lscpu\n")
            .reply_with(Err(AppError::timeout("numactl did not finish")))
            .reply_with(Ok(CommandOutput {
                status_code: Some(1),
                stdout: String::new(),
                stderr: "no dimms\n".to_string(),
            }))
            .reply("[]\n");
        let tools = tools();
        let logger = Logger::with_config("TEST".to_string(), &Config::default());

        let report = SystemSnapshot::new(&runner, &tools, &logger).capture(&config(dir.path())).await;

        assert_eq!(report.written.len(), 3);
        let failed: Vec<&str> = report.failed.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(failed, ["numactl.txt", "ipmctl_topology.txt"]);
        assert!(report.failed[1].1.contains("no dimms"));
        assert!(dir.path().join(SYSINFO_DIR).join("ndctl.txt").exists());
    }

    #[tokio::test]
    async fn test_dry_run_captures_nothing() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let tools = tools();
        let logger = Logger::with_config("TEST".to_string(), &Config::default());
        let mut cfg = config(dir.path());
        cfg.dry_run = true;

        let report = SystemSnapshot::new(&runner, &tools, &logger).capture(&cfg).await;

        assert_eq!(report, SnapshotReport::default());
        assert_eq!(runner.call_count(), 0);
        assert!(!dir.path().join(SYSINFO_DIR).exists());
    }

    #[test]
    fn test_host_summary_includes_config() {
        let summary = host_summary(&Config::default());
        assert!(summary.contains("Physical cores:"));
        assert!(summary.contains("PMem path:"));
    }
}
