//! Benchmark records and run summaries

use crate::executor::plan::MlcInvocation;
use crate::types::{TestKind, TestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One point of a loaded-latency curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyPoint {
    /// Injection delay in cycles
    pub delay: u32,
    pub latency_ns: f64,
    pub bandwidth_mbps: f64,
}

/// Figures scraped from one mlc run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    IdleLatency { latency_ns: f64, clocks: f64 },
    LoadedLatency(Vec<LatencyPoint>),
    Bandwidth { mbps: f64 },
    /// Labelled rows such as `ALL Reads`
    PeakBandwidth(Vec<(String, f64)>),
}

impl Measurement {
    /// Short one-line rendering used in progress logs
    pub fn headline(&self) -> String {
        match self {
            Measurement::IdleLatency { latency_ns, .. } => format!("{:.1} ns", latency_ns),
            Measurement::LoadedLatency(points) => {
                let peak = points.iter().map(|p| p.bandwidth_mbps).fold(0.0, f64::max);
                let floor = points.iter().map(|p| p.latency_ns).fold(f64::INFINITY, f64::min);
                format!("{} points, peak {:.1} MB/s, min {:.1} ns", points.len(), peak, floor)
            }
            Measurement::Bandwidth { mbps } => format!("{:.1} MB/s", mbps),
            Measurement::PeakBandwidth(rows) => match rows.first() {
                Some((label, mbps)) => format!("{}: {:.1} MB/s", label, mbps),
                None => "no rows".to_string(),
            },
        }
    }
}

/// Outcome of a single planned invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub invocation: MlcInvocation,
    pub status: TestStatus,
    pub measurement: Option<Measurement>,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl TestRecord {
    pub fn success(invocation: MlcInvocation, measurement: Measurement, elapsed: Duration) -> Self {
        Self {
            invocation,
            status: TestStatus::Success,
            measurement: Some(measurement),
            elapsed,
            timestamp: Utc::now(),
            error_message: None,
        }
    }

    pub fn failed(invocation: MlcInvocation, elapsed: Duration, error_message: String) -> Self {
        Self {
            invocation,
            status: TestStatus::Failed,
            measurement: None,
            elapsed,
            timestamp: Utc::now(),
            error_message: Some(error_message),
        }
    }

    pub fn timeout(invocation: MlcInvocation, elapsed: Duration) -> Self {
        Self {
            invocation,
            status: TestStatus::Timeout,
            measurement: None,
            elapsed,
            timestamp: Utc::now(),
            error_message: Some(format!("mlc timed out after {}s", elapsed.as_secs())),
        }
    }

    pub fn skipped(invocation: MlcInvocation, reason: String) -> Self {
        Self {
            invocation,
            status: TestStatus::Skipped,
            measurement: None,
            elapsed: Duration::ZERO,
            timestamp: Utc::now(),
            error_message: Some(reason),
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self.status, TestStatus::Success) && self.measurement.is_some()
    }

    pub fn kind(&self) -> TestKind {
        self.invocation.kind
    }
}

/// Counts and timing for a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_planned: usize,
    pub successful: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub total_duration: Duration,
    /// Version reported by the mlc banner
    pub mlc_version: Option<String>,
    pub interrupted: bool,
}

impl ExecutionSummary {
    pub fn from_records(records: &[TestRecord], total_planned: usize, total_duration: Duration) -> Self {
        let count = |status: TestStatus| records.iter().filter(|r| r.status == status).count();
        let recorded = records.len();
        Self {
            total_planned,
            successful: count(TestStatus::Success),
            failed: count(TestStatus::Failed),
            timed_out: count(TestStatus::Timeout),
            // Planned invocations that never got a record were not run either
            skipped: count(TestStatus::Skipped) + total_planned.saturating_sub(recorded),
            total_duration,
            mlc_version: None,
            interrupted: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.successful == self.total_planned && !self.interrupted
    }
}

/// Records of a run plus its summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResults {
    pub summary: ExecutionSummary,
    pub records: Vec<TestRecord>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionResults {
    pub fn new(summary: ExecutionSummary, records: Vec<TestRecord>, started_at: DateTime<Utc>) -> Self {
        Self { summary, records, started_at }
    }

    /// Successful records of one test kind, in run order
    pub fn of_kind(&self, kind: TestKind) -> impl Iterator<Item = &TestRecord> {
        self.records
            .iter()
            .filter(move |r| r.kind() == kind && r.is_successful())
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0 || self.summary.timed_out > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::plan::MlcInvocation;

    fn record(status: TestStatus) -> TestRecord {
        let invocation = MlcInvocation::for_tests(TestKind::BandwidthRamp, "bw_ramp_r_seq_1cpu.txt");
        match status {
            TestStatus::Success => {
                TestRecord::success(invocation, Measurement::Bandwidth { mbps: 1.0 }, Duration::from_secs(1))
            }
            TestStatus::Failed => TestRecord::failed(invocation, Duration::from_secs(1), "exit 1".to_string()),
            TestStatus::Timeout => TestRecord::timeout(invocation, Duration::from_secs(60)),
            TestStatus::Skipped => TestRecord::skipped(invocation, "interrupted".to_string()),
        }
    }

    #[test]
    fn test_summary_counts_unrun_invocations_as_skipped() {
        let records = vec![record(TestStatus::Success), record(TestStatus::Failed)];
        let summary = ExecutionSummary::from_records(&records, 5, Duration::from_secs(2));
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 3);
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_complete_summary() {
        let records = vec![record(TestStatus::Success), record(TestStatus::Success)];
        let summary = ExecutionSummary::from_records(&records, 2, Duration::from_secs(2));
        assert!(summary.is_complete());

        let results = ExecutionResults::new(summary, records, Utc::now());
        assert_eq!(results.of_kind(TestKind::BandwidthRamp).count(), 2);
        assert_eq!(results.of_kind(TestKind::PeakBandwidth).count(), 0);
        assert!(!results.has_failures());
    }

    #[test]
    fn test_timeout_record() {
        let r = record(TestStatus::Timeout);
        assert!(!r.is_successful());
        assert!(r.error_message.unwrap().contains("60s"));
    }

    #[test]
    fn test_headlines() {
        let loaded = Measurement::LoadedLatency(vec![
            LatencyPoint { delay: 0, latency_ns: 900.0, bandwidth_mbps: 30000.0 },
            LatencyPoint { delay: 20000, latency_ns: 300.0, bandwidth_mbps: 1000.0 },
        ]);
        assert_eq!(loaded.headline(), "2 points, peak 30000.0 MB/s, min 300.0 ns");
        assert_eq!(Measurement::IdleLatency { latency_ns: 171.84, clocks: 1.0 }.headline(), "171.8 ns");
    }
}
