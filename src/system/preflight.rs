//! System checks that must pass before any benchmark is started

use super::{CommandRunner, ResolvedTools};
use crate::error::{AppError, ErrorContext, Result};
use crate::models::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROC_MOUNTS: &str = "/proc/mounts";
const PROC_SELF_STATUS: &str = "/proc/self/status";
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// One PMem module as reported by `ipmctl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimmInfo {
    pub dimm_id: String,
    pub health_state: String,
    /// Capacity exactly as printed, e.g. `126.375 GiB`
    pub capacity: String,
    pub capacity_bytes: u64,
}

/// Address-range-scrub state of one NVDIMM bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusScrub {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub dev: String,
    #[serde(default)]
    pub scrub_state: Option<String>,
}

impl BusScrub {
    /// Only `idle` counts as finished; a bus that reports no state has nothing pending
    pub fn is_complete(&self) -> bool {
        match self.scrub_state.as_deref() {
            None => true,
            Some(state) => state.eq_ignore_ascii_case("idle"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScrubListing {
    Many(Vec<BusScrub>),
    One(BusScrub),
}

/// An entry of `/proc/mounts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub options: Vec<String>,
}

impl MountEntry {
    /// `dax`, `dax=always` and `dax=inode` all allow DAX mappings
    pub fn has_dax(&self) -> bool {
        self.options
            .iter()
            .any(|o| o == "dax" || o == "dax=always" || o == "dax=inode")
    }
}

/// What the preflight checks observed
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreflightReport {
    pub effective_uid: Option<u32>,
    pub mount: Option<MountEntry>,
    pub dimms: Vec<DimmInfo>,
    pub buses: Vec<BusScrub>,
    /// Hardware checks were skipped (dry run)
    pub skipped: bool,
}

/// Runs the privilege, mount, DIMM and scrub checks
pub struct PreflightChecker<'a> {
    runner: &'a dyn CommandRunner,
    tools: &'a ResolvedTools,
    pmem_path: PathBuf,
    mounts_path: PathBuf,
    status_path: PathBuf,
}

impl<'a> PreflightChecker<'a> {
    pub fn new(runner: &'a dyn CommandRunner, tools: &'a ResolvedTools, config: &Config) -> Self {
        Self {
            runner,
            tools,
            pmem_path: config.pmem_path.clone(),
            mounts_path: PathBuf::from(PROC_MOUNTS),
            status_path: PathBuf::from(PROC_SELF_STATUS),
        }
    }

    /// Read mount table and process status from other files
    pub fn with_proc_files(mut self, mounts: impl Into<PathBuf>, status: impl Into<PathBuf>) -> Self {
        self.mounts_path = mounts.into();
        self.status_path = status.into();
        self
    }

    /// Run every check in order, stopping at the first failure.
    /// A dry run skips everything that needs root or real hardware.
    pub async fn run(&self, dry_run: bool) -> Result<PreflightReport> {
        if dry_run {
            return Ok(PreflightReport { skipped: true, ..Default::default() });
        }

        let effective_uid = self.check_root().await?;
        let mount = self.check_dax_mount().await?;
        let dimms = self.check_dimms().await?;
        let buses = self.check_scrub().await?;

        Ok(PreflightReport {
            effective_uid: Some(effective_uid),
            mount: Some(mount),
            dimms,
            buses,
            skipped: false,
        })
    }

    pub async fn check_root(&self) -> Result<u32> {
        let status = read_proc(&self.status_path).await?;
        let uid = parse_effective_uid(&status)?;
        if uid != 0 {
            return Err(AppError::precondition(format!(
                "Root privileges are required (effective uid is {})",
                uid
            )));
        }
        Ok(uid)
    }

    pub async fn check_dax_mount(&self) -> Result<MountEntry> {
        let mounts = read_proc(&self.mounts_path).await?;
        let target = normalize(&self.pmem_path);

        // Later entries shadow earlier mounts on the same point.
        let entry = parse_mounts(&mounts)
            .into_iter()
            .filter(|m| normalize(&m.mount_point) == target)
            .last()
            .ok_or_else(|| {
                AppError::precondition(format!("{} is not a mount point", self.pmem_path.display()))
            })?;

        if !entry.has_dax() {
            return Err(AppError::precondition(format!(
                "{} ({} on {}) is not mounted with the dax option",
                self.pmem_path.display(),
                entry.fs_type,
                entry.device
            )));
        }
        Ok(entry)
    }

    pub async fn check_dimms(&self) -> Result<Vec<DimmInfo>> {
        let args = ["show", "-d", "HealthState,Capacity", "-dimm"].map(String::from);
        let output = self.runner.run(&self.tools.ipmctl, &args, QUERY_TIMEOUT).await?;
        output.ensure_success("ipmctl show -dimm")?;

        let dimms = parse_dimms(&output.stdout)?;
        if dimms.is_empty() {
            return Err(AppError::precondition("ipmctl reports no PMem modules"));
        }

        let unhealthy: Vec<String> = dimms
            .iter()
            .filter(|d| !d.health_state.eq_ignore_ascii_case("healthy"))
            .map(|d| format!("{} is {}", d.dimm_id, d.health_state))
            .collect();
        if !unhealthy.is_empty() {
            return Err(AppError::precondition(format!("Unhealthy PMem modules: {}", unhealthy.join(", "))));
        }

        let first = &dimms[0];
        if let Some(odd) = dimms.iter().find(|d| d.capacity_bytes != first.capacity_bytes) {
            return Err(AppError::precondition(format!(
                "PMem module capacities differ: {} has {} but {} has {}",
                first.dimm_id, first.capacity, odd.dimm_id, odd.capacity
            )));
        }

        Ok(dimms)
    }

    pub async fn check_scrub(&self) -> Result<Vec<BusScrub>> {
        let args = ["list", "--buses", "--scrub"].map(String::from);
        let output = self.runner.run(&self.tools.ndctl, &args, QUERY_TIMEOUT).await?;
        output.ensure_success("ndctl list --buses --scrub")?;

        let buses = parse_scrub(&output.stdout)?;
        if buses.is_empty() {
            return Err(AppError::precondition("ndctl reports no NVDIMM buses"));
        }

        let busy: Vec<String> = buses
            .iter()
            .filter(|b| !b.is_complete())
            .map(|b| format!("{} ({})", b.dev, b.scrub_state.as_deref().unwrap_or_default()))
            .collect();
        if !busy.is_empty() {
            return Err(AppError::precondition(format!(
                "Address range scrub is not idle on {}; wait for it to finish",
                busy.join(", ")
            )));
        }

        Ok(buses)
    }
}

async fn read_proc(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(AppError::from)
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

/// Effective uid: second field of the `Uid:` line
pub fn parse_effective_uid(status: &str) -> Result<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().nth(1))
        .and_then(|uid| uid.parse().ok())
        .ok_or_else(|| AppError::parse("No Uid line in process status"))
}

/// Parse `/proc/mounts`, decoding the octal escapes the kernel uses for
/// whitespace in paths
pub fn parse_mounts(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            let options = fields.next().unwrap_or("");
            Some(MountEntry {
                device: unescape_mount_field(device),
                mount_point: PathBuf::from(unescape_mount_field(mount_point)),
                fs_type: fs_type.to_string(),
                options: options.split(',').map(str::to_string).collect(),
            })
        })
        .collect()
}

fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b)) {
            let value = (bytes[i + 1] - b'0') as u32 * 64 + (bytes[i + 2] - b'0') as u32 * 8 + (bytes[i + 3] - b'0') as u32;
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse `ipmctl show -d HealthState,Capacity -dimm` output
pub fn parse_dimms(text: &str) -> Result<Vec<DimmInfo>> {
    let mut dimms = Vec::new();
    let mut current: Option<(String, Option<String>, Option<String>)> = None;

    let mut finish = |entry: Option<(String, Option<String>, Option<String>)>| -> Result<()> {
        if let Some((id, health, capacity)) = entry {
            let health = health.ok_or_else(|| AppError::parse(format!("No HealthState for DIMM {}", id)))?;
            let capacity = capacity.ok_or_else(|| AppError::parse(format!("No Capacity for DIMM {}", id)))?;
            dimms.push(DimmInfo {
                capacity_bytes: parse_capacity_bytes(&capacity)?,
                dimm_id: id,
                health_state: health,
                capacity,
            });
        }
        Ok(())
    };

    for line in text.lines().map(str::trim) {
        if let Some(id) = line
            .strip_prefix("---DimmID=")
            .and_then(|rest| rest.strip_suffix("---"))
        {
            finish(current.take())?;
            current = Some((id.to_string(), None, None));
        } else if let (Some(entry), Some((key, value))) = (current.as_mut(), line.split_once('=')) {
            match key.trim() {
                "HealthState" => entry.1 = Some(value.trim().to_string()),
                "Capacity" => entry.2 = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    finish(current.take())?;

    Ok(dimms)
}

/// Convert an ipmctl capacity such as `126.375 GiB` to bytes
pub fn parse_capacity_bytes(capacity: &str) -> Result<u64> {
    let mut parts = capacity.split_whitespace();
    let number: f64 = parts
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| AppError::parse(format!("Invalid capacity '{}'", capacity)))?;

    let scale: f64 = match parts.next().unwrap_or("B") {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        unit => return Err(AppError::parse(format!("Unknown capacity unit '{}'", unit))),
    };

    Ok((number * scale).round() as u64)
}

/// Parse `ndctl list --buses --scrub`; ndctl prints a bare object when
/// there is exactly one bus and nothing at all when there are none
pub fn parse_scrub(json: &str) -> Result<Vec<BusScrub>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let listing: ScrubListing = serde_json::from_str(json)
        .map_err(|e| AppError::parse(format!("Unexpected ndctl output: {}", e)))?;
    Ok(match listing {
        ScrubListing::Many(buses) => buses,
        ScrubListing::One(bus) => vec![bus],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testing::FakeRunner;
    use crate::system::CommandOutput;
    use tempfile::TempDir;

    const DIMMS_OK: &str = "\
 ---DimmID=0x0001---
    Capacity=126.375 GiB
    HealthState=Healthy
 ---DimmID=0x0011---
    Capacity=126.375 GiB
    HealthState=Healthy
";

    const SCRUB_IDLE: &str = r#"[{"provider":"ACPI.NFIT","dev":"ndbus0","scrub_state":"idle"}]"#;

    fn tools() -> ResolvedTools {
        ResolvedTools {
            mlc: "/usr/bin/mlc".into(),
            ipmctl: "/usr/bin/ipmctl".into(),
            ndctl: "/usr/bin/ndctl".into(),
            numactl: "/usr/bin/numactl".into(),
            lscpu: "/usr/bin/lscpu".into(),
        }
    }

    struct ProcFiles {
        _dir: TempDir,
        mounts: PathBuf,
        status: PathBuf,
    }

    fn proc_files(mounts: &str, uid_line: &str) -> ProcFiles {
        let dir = TempDir::new().unwrap();
        let mounts_path = dir.path().join("mounts");
        let status_path = dir.path().join("status");
        std::fs::write(&mounts_path, mounts).unwrap();
        std::fs::write(&status_path, format!("Name:\tmlc\n{}\nGid:\t0\t0\t0\t0\n", uid_line)).unwrap();
        ProcFiles { _dir: dir, mounts: mounts_path, status: status_path }
    }

    const DAX_MOUNTS: &str = "\
/dev/sda1 / ext4 rw,relatime 0 0
/dev/pmem0 /mnt/pmem0 ext4 rw,relatime,dax=always 0 0
";

    #[tokio::test]
    async fn test_full_preflight_passes() {
        let runner = FakeRunner::new().reply(DIMMS_OK).reply(SCRUB_IDLE);
        let tools = tools();
        let files = proc_files(DAX_MOUNTS, "Uid:\t1000\t0\t0\t0");
        let checker = PreflightChecker::new(&runner, &tools, &Config::default())
            .with_proc_files(&files.mounts, &files.status);

        let report = checker.run(false).await.unwrap();
        assert_eq!(report.effective_uid, Some(0));
        assert_eq!(report.dimms.len(), 2);
        assert_eq!(report.buses[0].dev, "ndbus0");
        assert!(!report.skipped);
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_skips_hardware() {
        let runner = FakeRunner::new();
        let tools = tools();
        let checker = PreflightChecker::new(&runner, &tools, &Config::default())
            .with_proc_files("/nonexistent/mounts", "/nonexistent/status");
        let report = checker.run(true).await.unwrap();
        assert!(report.skipped);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_non_root_rejected() {
        let runner = FakeRunner::new();
        let tools = tools();
        let files = proc_files(DAX_MOUNTS, "Uid:\t0\t1000\t1000\t1000");
        let checker = PreflightChecker::new(&runner, &tools, &Config::default())
            .with_proc_files(&files.mounts, &files.status);

        let err = checker.run(false).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("effective uid is 1000"));
    }

    #[tokio::test]
    async fn test_mount_without_dax_rejected() {
        let runner = FakeRunner::new();
        let tools = tools();
        let files = proc_files("/dev/pmem0 /mnt/pmem0 xfs rw,dax=never 0 0\n", "Uid:\t0\t0\t0\t0");
        let checker = PreflightChecker::new(&runner, &tools, &Config::default())
            .with_proc_files(&files.mounts, &files.status);
        let err = checker.check_dax_mount().await.unwrap_err();
        assert!(err.to_string().contains("dax option"));

        let files = proc_files("/dev/sda1 / ext4 rw 0 0\n", "Uid:\t0\t0\t0\t0");
        let checker = PreflightChecker::new(&runner, &tools, &Config::default())
            .with_proc_files(&files.mounts, &files.status);
        let err = checker.check_dax_mount().await.unwrap_err();
        assert!(err.to_string().contains("not a mount point"));
    }

    #[tokio::test]
    async fn test_unhealthy_and_mismatched_dimms() {
        let tools = tools();
        let config = Config::default();

        let runner = FakeRunner::new().reply(" ---DimmID=0x0001---\n Capacity=126.375 GiB\n HealthState=Critical Failure\n");
        let err = PreflightChecker::new(&runner, &tools, &config).check_dimms().await.unwrap_err();
        assert!(err.to_string().contains("0x0001 is Critical Failure"));

        let runner = FakeRunner::new().reply(
            " ---DimmID=0x0001---\n Capacity=126.375 GiB\n HealthState=Healthy\n ---DimmID=0x0101---\n Capacity=252.750 GiB\n HealthState=Healthy\n",
        );
        let err = PreflightChecker::new(&runner, &tools, &config).check_dimms().await.unwrap_err();
        assert!(err.to_string().contains("capacities differ"));

        let runner = FakeRunner::new().reply("No functional DIMMs in the system\n");
        let err = PreflightChecker::new(&runner, &tools, &config).check_dimms().await.unwrap_err();
        assert!(err.to_string().contains("no PMem modules"));
    }

    #[tokio::test]
    async fn test_ipmctl_failure_is_execution_error() {
        let runner = FakeRunner::new().reply_with(Ok(CommandOutput {
            status_code: Some(1),
            stdout: String::new(),
            stderr: "Failed to open driver\n".to_string(),
        }));
        let tools = tools();
        let err = PreflightChecker::new(&runner, &tools, &Config::default()).check_dimms().await.unwrap_err();
        assert_eq!(err.category(), "EXEC");
    }

    #[tokio::test]
    async fn test_active_scrub_rejected() {
        let runner = FakeRunner::new().reply(r#"{"provider":"ACPI.NFIT","dev":"ndbus0","scrub_state":"active"}"#);
        let tools = tools();
        let err = PreflightChecker::new(&runner, &tools, &Config::default()).check_scrub().await.unwrap_err();
        assert!(err.to_string().contains("ndbus0"));

        let runner = FakeRunner::new().reply("");
        let err = PreflightChecker::new(&runner, &tools, &Config::default()).check_scrub().await.unwrap_err();
        assert!(err.to_string().contains("no NVDIMM buses"));
    }

    #[test]
    fn test_scrub_without_state_counts_as_complete() {
        let buses = parse_scrub(r#"[{"provider":"ACPI.NFIT","dev":"ndbus0"}]"#).unwrap();
        assert!(buses[0].is_complete());
        assert!(parse_scrub("not json").is_err());
    }

    #[test]
    fn test_only_idle_scrub_state_is_complete() {
        let buses = parse_scrub(
            r#"[{"dev":"ndbus0","scrub_state":"idle"},{"dev":"ndbus1","scrub_state":"unknown"},{"dev":"ndbus2","scrub_state":"IDLE"}]"#,
        )
        .unwrap();
        assert!(buses[0].is_complete());
        assert!(!buses[1].is_complete());
        assert!(buses[2].is_complete());
    }

    #[tokio::test]
    async fn test_unexpected_scrub_state_rejected() {
        let runner = FakeRunner::new().reply(r#"[{"dev":"ndbus0","scrub_state":"idle"},{"dev":"ndbus1","scrub_state":"unknown"}]"#);
        let tools = tools();
        let err = PreflightChecker::new(&runner, &tools, &Config::default()).check_scrub().await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("ndbus1 (unknown)"));
        assert!(!err.to_string().contains("ndbus0"));
    }

    #[test]
    fn test_capacity_units() {
        assert_eq!(parse_capacity_bytes("1 KiB").unwrap(), 1024);
        assert_eq!(parse_capacity_bytes("0.5 TiB").unwrap(), parse_capacity_bytes("512 GiB").unwrap());
        assert_eq!(parse_capacity_bytes("4096").unwrap(), 4096);
        assert!(parse_capacity_bytes("12 PB").is_err());
        assert!(parse_capacity_bytes("GiB").is_err());
    }

    #[test]
    fn test_mount_escapes_decoded() {
        let mounts = parse_mounts("/dev/pmem1 /mnt/pmem\\040one ext4 rw,dax 0 0\n");
        assert_eq!(mounts[0].mount_point, PathBuf::from("/mnt/pmem one"));
        assert!(mounts[0].has_dax());
    }

    #[test]
    fn test_effective_uid() {
        assert_eq!(parse_effective_uid("Uid:\t1000\t0\t0\t0\n").unwrap(), 0);
        assert!(parse_effective_uid("Name: x\n").is_err());
    }
}
