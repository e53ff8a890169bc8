//! External command plumbing shared by preflight checks, topology discovery
//! and the benchmark executor.

pub mod preflight;
pub mod topology;

pub use preflight::{PreflightChecker, PreflightReport, DimmInfo, BusScrub, MountEntry};
pub use topology::{CpuTopology, NumaNode, parse_cpu_list, format_cpu_list};

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    /// Turn a non-zero exit into an execution error naming the command
    pub fn ensure_success(&self, what: &str) -> Result<()> {
        if self.success() {
            return Ok(());
        }

        let status = match self.status_code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let detail = self.stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
        if detail.is_empty() {
            Err(AppError::execution(format!("{} failed ({})", what, status)))
        } else {
            Err(AppError::execution(format!("{} failed ({}): {}", what, status, detail)))
        }
    }
}

/// Runs external programs. The executor and preflight checks only talk to
/// this trait so tests can substitute canned tool output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<CommandOutput>;
}

/// Runs commands as real child processes via tokio
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future (timeout, Ctrl-C) must not leave mlc running.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AppError::missing_tool(program.display().to_string()),
                _ => AppError::execution(format!("Failed to start {}: {}", program.display(), e)),
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::timeout(format!("{} did not finish within {}s", program.display(), timeout.as_secs()))
            })??;

        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Absolute locations of every external tool used by a run
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTools {
    pub mlc: PathBuf,
    pub ipmctl: PathBuf,
    pub ndctl: PathBuf,
    pub numactl: PathBuf,
    pub lscpu: PathBuf,
}

impl ResolvedTools {
    /// Resolve every configured tool, reporting all missing ones at once
    pub fn resolve(config: &crate::models::Config) -> Result<Self> {
        Self::resolve_with_search_path(config, std::env::var_os("PATH"))
    }

    pub fn resolve_with_search_path(config: &crate::models::Config, search_path: Option<OsString>) -> Result<Self> {
        let wanted = [
            ("mlc", &config.mlc_path),
            ("ipmctl", &config.ipmctl_path),
            ("ndctl", &config.ndctl_path),
            ("numactl", &config.numactl_path),
            ("lscpu", &config.lscpu_path),
        ];

        let mut found = Vec::with_capacity(wanted.len());
        let mut missing = Vec::new();
        for (name, path) in wanted {
            match resolve_tool(path, search_path.as_deref()) {
                Some(resolved) => found.push(resolved),
                None => missing.push(format!("{} ({})", name, path.display())),
            }
        }

        if !missing.is_empty() {
            return Err(AppError::missing_tool(missing.join(", ")));
        }

        let mut found = found.into_iter();
        let mut next = || found.next().ok_or_else(|| AppError::internal("tool list exhausted"));
        Ok(Self {
            mlc: next()?,
            ipmctl: next()?,
            ndctl: next()?,
            numactl: next()?,
            lscpu: next()?,
        })
    }
}

/// Resolve a tool the way a shell would: paths containing a separator are
/// taken as-is, bare names are searched in `search_path`.
pub fn resolve_tool(tool: &Path, search_path: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    if tool.components().count() > 1 || tool.is_absolute() {
        return is_executable(tool).then(|| tool.to_path_buf());
    }

    let search_path = search_path?;
    std::env::split_paths(search_path)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
